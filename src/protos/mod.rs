//! Wire messages exchanged with the transport layer.
//!
//! These mirror the `GroupContext` protobuf carried inside data messages.
//! They are declared with prost derives directly so the crate builds without
//! `protoc`; the field tags below are the wire contract and must not change.

pub mod groups {
    pub mod v1 {
        /// Group control payload: the canonical update on the wire.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct GroupContext {
            #[prost(bytes = "vec", tag = "1")]
            pub id: ::prost::alloc::vec::Vec<u8>,
            #[prost(enumeration = "group_context::Type", tag = "2")]
            pub r#type: i32,
            #[prost(string, optional, tag = "3")]
            pub name: ::core::option::Option<::prost::alloc::string::String>,
            #[prost(string, repeated, tag = "4")]
            pub members: ::prost::alloc::vec::Vec<::prost::alloc::string::String>,
            #[prost(message, optional, tag = "5")]
            pub avatar: ::core::option::Option<AttachmentPointer>,
        }

        pub mod group_context {
            #[derive(
                Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration,
            )]
            #[repr(i32)]
            pub enum Type {
                Unknown = 0,
                Update = 1,
                Deliver = 2,
                Quit = 3,
                RequestInfo = 4,
            }
        }

        /// Pointer to an encrypted attachment held by the attachment service.
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct AttachmentPointer {
            #[prost(fixed64, tag = "1")]
            pub id: u64,
            #[prost(string, optional, tag = "2")]
            pub content_type: ::core::option::Option<::prost::alloc::string::String>,
            #[prost(bytes = "vec", tag = "3")]
            pub key: ::prost::alloc::vec::Vec<u8>,
        }
    }
}
