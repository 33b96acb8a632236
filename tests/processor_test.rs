//! Integration tests for `GroupProcessor::process`.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use prost::Message;

use group_reconciler::app::{GroupLocks, GroupProcessor, ProcessorConfig, ReconcilerProvider};
use group_reconciler::core::{
    AvatarPointer, CanonicalUpdate, Direction, EventKind, GroupEvent, GroupId, GroupRecord,
    HistoryStore, IncomingEntry, MessageId, Notifier, OutgoingEntry, RosterBatch, RosterStore,
    SideEffect, StorageError, Task, TaskRunner, ThreadId, UpdateKind,
};
use group_reconciler::ds::{decode_update, InboundEnvelope};
use group_reconciler::protos::groups::v1::{group_context, GroupContext};
use group_reconciler::storage::{
    MemoryHistoryStore, MemoryRosterStore, MemoryThreadStore, StoredIncoming, StoredOutgoing,
};

// ─────────────────────────── Mock Collaborators ───────────────────────────

#[derive(Debug, Clone)]
enum Event {
    Notified(ThreadId),
    Queued(Task),
}

#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<Event>>>,
    /// Whether the task's group lock was held when it was enqueued.
    enqueued_locked: Arc<Mutex<Vec<bool>>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn notifications(&self) -> Vec<ThreadId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Notified(thread) => Some(thread),
                _ => None,
            })
            .collect()
    }

    fn tasks(&self) -> Vec<Task> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Queued(task) => Some(task),
                _ => None,
            })
            .collect()
    }
}

struct MockNotifier(Recorder);

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, thread: ThreadId) {
        self.0.events.lock().unwrap().push(Event::Notified(thread));
    }
}

struct MockRunner {
    recorder: Recorder,
    locks: OnceLock<Arc<GroupLocks>>,
}

impl TaskRunner for MockRunner {
    fn enqueue(&self, task: Task) {
        if let Some(locks) = self.locks.get() {
            let held = locks.is_locked(task.effect.group_id());
            self.recorder.enqueued_locked.lock().unwrap().push(held);
        }
        self.recorder.events.lock().unwrap().push(Event::Queued(task));
    }
}

/// Roster store whose writes can be made to fail.
#[derive(Default)]
struct FlakyRosterStore {
    inner: MemoryRosterStore,
    failing: AtomicBool,
}

impl RosterStore for FlakyRosterStore {
    fn get(&self, group_id: &GroupId) -> Result<Option<GroupRecord>, StorageError> {
        self.inner.get(group_id)
    }

    fn apply(&self, group_id: &GroupId, batch: &RosterBatch) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("disk full".to_string()));
        }
        self.inner.apply(group_id, batch)
    }

    fn restore(
        &self,
        group_id: &GroupId,
        snapshot: Option<GroupRecord>,
    ) -> Result<(), StorageError> {
        self.inner.restore(group_id, snapshot)
    }
}

/// History store whose next inbox write can be made to fail.
#[derive(Default)]
struct FlakyHistoryStore {
    inner: MemoryHistoryStore,
    fail_next_inbox: AtomicBool,
}

impl FlakyHistoryStore {
    fn inbox(&self) -> Result<Vec<StoredIncoming>, StorageError> {
        self.inner.inbox()
    }

    fn outbox(&self) -> Result<Vec<StoredOutgoing>, StorageError> {
        self.inner.outbox()
    }
}

impl HistoryStore for FlakyHistoryStore {
    fn insert_outbox(&self, entry: OutgoingEntry) -> Result<MessageId, StorageError> {
        self.inner.insert_outbox(entry)
    }

    fn mark_sent(&self, message: MessageId) -> Result<(), StorageError> {
        self.inner.mark_sent(message)
    }

    fn insert_inbox(&self, entry: IncomingEntry) -> Result<Option<MessageId>, StorageError> {
        if self.fail_next_inbox.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Backend("inbox unavailable".to_string()));
        }
        self.inner.insert_inbox(entry)
    }
}

struct MockProvider;

impl ReconcilerProvider for MockProvider {
    type Roster = FlakyRosterStore;
    type Threads = MemoryThreadStore;
    type History = FlakyHistoryStore;
    type Notifier = MockNotifier;
    type Runner = MockRunner;
}

// ─────────────────────────── Helpers ───────────────────────────

struct Harness {
    processor: Arc<GroupProcessor<MockProvider>>,
    roster: Arc<FlakyRosterStore>,
    history: Arc<FlakyHistoryStore>,
    recorder: Recorder,
}

impl Harness {
    fn new() -> Self {
        let recorder = Recorder::default();
        let roster = Arc::new(FlakyRosterStore::default());
        let history = Arc::new(FlakyHistoryStore::default());
        let runner = Arc::new(MockRunner {
            recorder: recorder.clone(),
            locks: OnceLock::new(),
        });
        let processor: GroupProcessor<MockProvider> = GroupProcessor::new(
            roster.clone(),
            Arc::new(MemoryThreadStore::new()),
            history.clone(),
            Arc::new(MockNotifier(recorder.clone())),
            runner.clone(),
            &ProcessorConfig::default(),
        );
        let _ = runner.locks.set(processor.locks().clone());
        Self {
            processor: Arc::new(processor),
            roster,
            history,
            recorder,
        }
    }

    fn record(&self, group: &GroupId) -> Option<GroupRecord> {
        self.roster.get(group).unwrap()
    }

    fn last_incoming(&self) -> CanonicalUpdate {
        let inbox = self.history.inbox().unwrap();
        let body = &inbox.last().expect("inbox is empty").entry.body;
        decode_update(&STANDARD.decode(body).unwrap()).unwrap()
    }
}

fn group() -> GroupId {
    GroupId::new(vec![0xab, 0xcd])
}

fn set(members: &[&str]) -> BTreeSet<String> {
    members.iter().map(|m| m.to_string()).collect()
}

fn event(kind: EventKind, sender: &str, members: Option<&[&str]>, timestamp: u64) -> GroupEvent {
    GroupEvent {
        group_id: group(),
        kind,
        name: None,
        avatar: None,
        members: members.map(|m| m.iter().map(|s| s.to_string()).collect()),
        sender: sender.to_string(),
        sender_device: 1,
        relay: None,
        timestamp,
        direction: Direction::Incoming,
    }
}

fn update(members: &[&str], timestamp: u64) -> GroupEvent {
    event(EventKind::Update, "alice", Some(members), timestamp)
}

fn avatar(id: u64) -> AvatarPointer {
    AvatarPointer {
        id,
        key: vec![1, 2, 3],
        content_type: Some("image/png".to_string()),
    }
}

// ─────────────────────────── Create / Update ───────────────────────────

#[tokio::test]
async fn test_create_records_group_and_notifies() {
    let h = Harness::new();
    let mut create = update(&["alice", "bob"], 1);
    create.name = Some("Team".to_string());
    create.relay = Some("relay-1".to_string());

    let thread = h.processor.process(create).await.expect("should record");

    let record = h.record(&group()).unwrap();
    assert_eq!(record.members, set(&["alice", "bob"]));
    assert_eq!(record.title.as_deref(), Some("Team"));
    assert_eq!(record.relay.as_deref(), Some("relay-1"));
    assert!(record.active);

    let canonical = h.last_incoming();
    assert_eq!(canonical.kind, UpdateKind::Update);
    assert_eq!(canonical.members, vec!["alice", "bob"]);
    assert_eq!(h.recorder.notifications(), vec![thread]);
}

#[tokio::test]
async fn test_repeated_create_is_idempotent() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;
    let before = h.record(&group());

    h.processor.process(update(&["alice", "bob"], 2)).await;

    assert_eq!(h.record(&group()), before);
    assert!(h.last_incoming().members.is_empty());
}

#[tokio::test]
async fn test_update_materializes_only_added_members() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;
    h.processor
        .process(update(&["alice", "bob", "carol"], 2))
        .await
        .unwrap();

    assert_eq!(
        h.record(&group()).unwrap().members,
        set(&["alice", "bob", "carol"])
    );
    assert_eq!(h.last_incoming().members, vec!["carol"]);
}

#[tokio::test]
async fn test_update_never_evicts_missing_members() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob", "carol"], 1)).await;

    let thread = h.processor.process(update(&["alice", "bob"], 2)).await;

    assert!(thread.is_some());
    assert_eq!(
        h.record(&group()).unwrap().members,
        set(&["alice", "bob", "carol"])
    );
    assert!(h.last_incoming().members.is_empty());
}

#[tokio::test]
async fn test_update_name_same_as_title_is_not_repeated() {
    let h = Harness::new();
    let mut create = update(&["alice"], 1);
    create.name = Some("Team".to_string());
    h.processor.process(create).await;

    let mut same = update(&["alice"], 2);
    same.name = Some("Team".to_string());
    h.processor.process(same).await;
    assert_eq!(h.last_incoming().name, None);

    let mut renamed = update(&["alice"], 3);
    renamed.name = Some("Crew".to_string());
    h.processor.process(renamed).await;
    assert_eq!(h.last_incoming().name.as_deref(), Some("Crew"));
    assert_eq!(h.record(&group()).unwrap().title.as_deref(), Some("Crew"));
}

#[tokio::test]
async fn test_out_of_order_updates_converge() {
    let a = Harness::new();
    a.processor.process(update(&["alice", "bob"], 1)).await;
    a.processor.process(update(&["alice", "bob", "carol"], 2)).await;

    let b = Harness::new();
    b.processor.process(update(&["alice", "bob", "carol"], 2)).await;
    b.processor.process(update(&["alice", "bob"], 1)).await;

    assert_eq!(
        a.record(&group()).unwrap().members,
        b.record(&group()).unwrap().members
    );
}

#[tokio::test]
async fn test_duplicate_add_after_create_converges() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;
    h.processor.process(update(&["alice", "bob", "carol"], 3)).await;
    h.processor.process(update(&["alice", "bob", "carol"], 2)).await;

    assert_eq!(
        h.record(&group()).unwrap().members,
        set(&["alice", "bob", "carol"])
    );
    assert!(h.last_incoming().members.is_empty());
}

// ─────────────────────────── Leave ───────────────────────────

#[tokio::test]
async fn test_leave_removes_exactly_the_sender() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob", "carol"], 1)).await;

    let thread = h
        .processor
        .process(event(EventKind::Quit, "bob", None, 2))
        .await;

    assert!(thread.is_some());
    let record = h.record(&group()).unwrap();
    assert_eq!(record.members, set(&["alice", "carol"]));
    assert!(record.active);
    assert_eq!(h.last_incoming().kind, UpdateKind::Quit);
}

#[tokio::test]
async fn test_leave_from_non_member_changes_nothing() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;
    let before = h.record(&group());
    let inbox_before = h.history.inbox().unwrap().len();

    let thread = h
        .processor
        .process(event(EventKind::Quit, "mallory", None, 2))
        .await;

    assert_eq!(thread, None);
    assert_eq!(h.record(&group()), before);
    assert_eq!(h.history.inbox().unwrap().len(), inbox_before);
    assert_eq!(h.recorder.notifications().len(), 1);
}

#[tokio::test]
async fn test_local_leave_deactivates_and_update_reactivates() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;

    let mut quit = event(EventKind::Quit, "alice", None, 2);
    quit.direction = Direction::Outgoing;
    assert!(h.processor.process(quit).await.is_some());

    let record = h.record(&group()).unwrap();
    assert!(!record.active);
    assert_eq!(record.members, set(&["bob"]));

    h.processor.process(update(&["alice", "bob"], 3)).await;
    let record = h.record(&group()).unwrap();
    assert!(record.active);
    assert_eq!(record.members, set(&["alice", "bob"]));
}

// ─────────────────────────── Info Request ───────────────────────────

#[tokio::test]
async fn test_info_request_schedules_push_without_mutation() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;
    let before = h.record(&group());
    let inbox_before = h.history.inbox().unwrap().len();

    let thread = h
        .processor
        .process(event(EventKind::RequestInfo, "bob", None, 2))
        .await;

    assert_eq!(thread, None);
    assert_eq!(h.record(&group()), before);
    assert_eq!(h.history.inbox().unwrap().len(), inbox_before);

    let tasks = h.recorder.tasks();
    assert_eq!(tasks.len(), 1);
    match &tasks[0].effect {
        SideEffect::PushRoster { recipient, record } => {
            assert_eq!(recipient, "bob");
            assert_eq!(Some(record.clone()), before);
        }
        other => panic!("unexpected effect {other:?}"),
    }
}

#[tokio::test]
async fn test_info_request_from_non_member_is_ignored() {
    let h = Harness::new();
    h.processor.process(update(&["alice"], 1)).await;

    let thread = h
        .processor
        .process(event(EventKind::RequestInfo, "mallory", None, 2))
        .await;

    assert_eq!(thread, None);
    assert!(h.recorder.tasks().is_empty());
}

// ─────────────────────────── Rejections ───────────────────────────

#[tokio::test]
async fn test_event_without_group_id_is_rejected() {
    let h = Harness::new();
    let mut invalid = update(&["alice"], 1);
    invalid.group_id = GroupId::new(Vec::new());

    assert_eq!(h.processor.process(invalid).await, None);
    assert!(h.roster.inner.records().unwrap().is_empty());
    assert!(h.history.inbox().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_event_shapes_are_rejected() {
    let h = Harness::new();

    let quit_unknown = event(EventKind::Quit, "alice", None, 1);
    let info_unknown = event(EventKind::RequestInfo, "alice", None, 2);
    let deliver = event(EventKind::Deliver, "alice", Some(&["alice"]), 3);

    assert_eq!(h.processor.process(quit_unknown).await, None);
    assert_eq!(h.processor.process(info_unknown).await, None);
    assert_eq!(h.processor.process(deliver).await, None);
    assert_eq!(h.record(&group()), None);
    assert!(h.recorder.events().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_leaves_state_unchanged() {
    let h = Harness::new();
    h.processor.process(update(&["alice"], 1)).await;
    let before = h.record(&group());
    let inbox_before = h.history.inbox().unwrap().len();

    h.roster.failing.store(true, Ordering::SeqCst);
    let mut grow = update(&["alice", "bob"], 2);
    grow.avatar = Some(avatar(9));

    assert_eq!(h.processor.process(grow).await, None);
    assert_eq!(h.record(&group()), before);
    assert_eq!(h.history.inbox().unwrap().len(), inbox_before);
    assert_eq!(h.recorder.notifications().len(), 1);
    assert!(h.recorder.tasks().is_empty());
}

#[tokio::test]
async fn test_history_failure_rolls_back_roster() {
    let h = Harness::new();
    h.processor.process(update(&["alice"], 1)).await;
    let before = h.record(&group());

    h.history.fail_next_inbox.store(true, Ordering::SeqCst);
    let mut grow = update(&["alice", "bob"], 2);
    grow.avatar = Some(avatar(4));

    assert_eq!(h.processor.process(grow.clone()).await, None);
    assert_eq!(h.record(&group()), before);
    assert_eq!(h.history.inbox().unwrap().len(), 1);
    assert_eq!(h.recorder.notifications().len(), 1);
    assert!(h.recorder.tasks().is_empty());

    // Transport redelivery reconciles against the restored record.
    let thread = h.processor.process(grow).await;
    assert!(thread.is_some());
    assert_eq!(h.record(&group()).unwrap().members, set(&["alice", "bob"]));
    assert_eq!(h.last_incoming().members, vec!["bob"]);
    assert_eq!(h.recorder.notifications().len(), 2);
    assert_eq!(h.recorder.tasks().len(), 1);
}

#[tokio::test]
async fn test_history_failure_on_create_leaves_no_record() {
    let h = Harness::new();
    h.history.fail_next_inbox.store(true, Ordering::SeqCst);

    assert_eq!(h.processor.process(update(&["alice", "bob"], 1)).await, None);
    assert_eq!(h.record(&group()), None);

    assert!(h.processor.process(update(&["alice", "bob"], 1)).await.is_some());
    assert_eq!(h.last_incoming().members, vec!["alice", "bob"]);
}

// ─────────────────────────── Materialization ───────────────────────────

#[tokio::test]
async fn test_outgoing_update_is_sent_without_notification() {
    let h = Harness::new();
    let mut local = update(&["alice", "bob"], 1);
    local.direction = Direction::Outgoing;

    let thread = h.processor.process(local).await.expect("should record");

    let outbox = h.history.outbox().unwrap();
    assert_eq!(outbox.len(), 1);
    assert!(outbox[0].sent);
    assert_eq!(outbox[0].entry.thread, thread);
    assert!(h.history.inbox().unwrap().is_empty());
    assert!(h.recorder.notifications().is_empty());
}

#[tokio::test]
async fn test_redelivered_event_is_recorded_once() {
    let h = Harness::new();
    h.processor.process(update(&["alice"], 1)).await;

    let first = h.processor.process(update(&["alice", "bob"], 2)).await;
    let again = h.processor.process(update(&["alice", "bob"], 2)).await;

    assert!(first.is_some());
    assert_eq!(again, None);
    assert_eq!(h.history.inbox().unwrap().len(), 2);
    assert_eq!(h.recorder.notifications().len(), 2);
}

#[tokio::test]
async fn test_same_sender_and_time_in_two_groups_both_record() {
    let h = Harness::new();
    let mut first = update(&["alice", "bob"], 7);
    first.group_id = GroupId::new(vec![1]);
    let mut second = update(&["alice", "carol"], 7);
    second.group_id = GroupId::new(vec![2]);

    let one = h.processor.process(first).await;
    let two = h.processor.process(second).await;

    assert!(one.is_some());
    assert!(two.is_some());
    assert_ne!(one, two);
    assert_eq!(h.history.inbox().unwrap().len(), 2);
    assert_eq!(h.recorder.notifications().len(), 2);
}

#[tokio::test]
async fn test_thread_is_stable_per_group() {
    let h = Harness::new();
    let first = h.processor.process(update(&["alice"], 1)).await;
    let second = h.processor.process(update(&["alice", "bob"], 2)).await;

    let mut other = update(&["alice"], 3);
    other.group_id = GroupId::new(vec![0x01]);
    let third = h.processor.process(other).await;

    assert_eq!(first, second);
    assert_ne!(first, third);
}

// ─────────────────────────── Side Effects ───────────────────────────

#[tokio::test]
async fn test_newer_avatar_supersedes_pending_fetch() {
    let h = Harness::new();
    let mut create = update(&["alice"], 1);
    create.avatar = Some(avatar(1));
    h.processor.process(create).await;

    let mut change = update(&["alice"], 2);
    change.avatar = Some(avatar(2));
    h.processor.process(change).await;

    let tasks = h.recorder.tasks();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].token.is_cancelled());
    assert!(!tasks[1].token.is_cancelled());
    assert_eq!(
        tasks[1].effect,
        SideEffect::FetchAvatar {
            group_id: group(),
            pointer: avatar(2),
        }
    );
    assert_eq!(h.record(&group()).unwrap().avatar, Some(avatar(2)));
}

#[tokio::test]
async fn test_side_effects_are_handed_off_under_the_group_lock() {
    let h = Harness::new();
    h.processor.process(update(&["alice", "bob"], 1)).await;

    let mut change = update(&["alice", "bob"], 2);
    change.avatar = Some(avatar(5));
    h.processor.process(change).await;
    h.processor
        .process(event(EventKind::RequestInfo, "bob", None, 3))
        .await;

    let held = h.recorder.enqueued_locked.lock().unwrap().clone();
    assert_eq!(held, vec![true, true]);
    assert!(!h.processor.locks().is_locked(&group()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_avatar_changes_fetch_the_stored_avatar() {
    let h = Harness::new();
    h.processor.process(update(&["alice"], 0)).await;

    let handles = (1..=16u64).map(|i| {
        let processor = h.processor.clone();
        let mut change = update(&["alice"], i);
        change.avatar = Some(avatar(i));
        tokio::spawn(async move { processor.process(change).await })
    });
    futures::future::join_all(handles).await;

    let live: Vec<Task> = h
        .recorder
        .tasks()
        .into_iter()
        .filter(|task| !task.token.is_cancelled())
        .collect();
    assert_eq!(live.len(), 1);
    let stored = h.record(&group()).unwrap().avatar.unwrap();
    assert_eq!(
        live[0].effect,
        SideEffect::FetchAvatar {
            group_id: group(),
            pointer: stored,
        }
    );
}

// ─────────────────────────── Concurrency ───────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_updates_for_one_group_all_land() {
    let h = Harness::new();
    h.processor.process(update(&["alice"], 0)).await;

    let handles = (1..=32u64).map(|i| {
        let processor = h.processor.clone();
        let member = format!("member-{i}");
        tokio::spawn(async move {
            processor
                .process(update(&["alice", member.as_str()], i))
                .await
        })
    });
    let results = futures::future::join_all(handles).await;

    assert!(results.into_iter().all(|r| r.unwrap().is_some()));
    let members = h.record(&group()).unwrap().members;
    assert_eq!(members.len(), 33);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_groups_are_processed_independently() {
    let h = Harness::new();

    let handles = (1..=16u8).map(|i| {
        let processor = h.processor.clone();
        let mut create = update(&["alice", "bob"], i as u64);
        create.group_id = GroupId::new(vec![i]);
        tokio::spawn(async move { processor.process(create).await })
    });
    let threads: BTreeSet<ThreadId> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    assert_eq!(threads.len(), 16);
    assert_eq!(h.roster.inner.records().unwrap().len(), 16);
}

// ─────────────────────────── Wire ───────────────────────────

#[tokio::test]
async fn test_process_envelope_decodes_wire_payload() {
    let h = Harness::new();
    let context = GroupContext {
        id: group().as_bytes().to_vec(),
        r#type: group_context::Type::Update as i32,
        name: Some("Team".to_string()),
        members: vec!["alice".to_string(), "bob".to_string()],
        avatar: None,
    };
    let envelope =
        InboundEnvelope::new("alice", 2, 10, context.encode_to_vec()).with_relay("relay-1");

    let thread = h
        .processor
        .process_envelope(&envelope, Direction::Incoming)
        .await;

    assert!(thread.is_some());
    let record = h.record(&group()).unwrap();
    assert_eq!(record.members, set(&["alice", "bob"]));
    assert_eq!(record.relay.as_deref(), Some("relay-1"));
    assert_eq!(h.history.inbox().unwrap()[0].entry.sender_device, 2);
}

#[tokio::test]
async fn test_process_envelope_drops_garbage() {
    let h = Harness::new();
    let envelope = InboundEnvelope::new("alice", 1, 10, vec![0xff, 0xff, 0xff]);

    assert_eq!(
        h.processor
            .process_envelope(&envelope, Direction::Incoming)
            .await,
        None
    );
    assert!(h.recorder.events().is_empty());
}
