//! Group state and signed group changes (`Groups.proto`).

#[derive(Clone, PartialEq, prost::Message)]
pub struct Member {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub user_id: Option<Vec<u8>>,
    #[prost(enumeration = "member::Role", optional, tag = "2")]
    pub role: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub profile_key: Option<Vec<u8>>,
    /// Only set on the way in; zeroed before the group state is stored.
    #[prost(bytes = "vec", optional, tag = "4")]
    pub presentation: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "5")]
    pub joined_at_revision: Option<u32>,
}

pub mod member {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Role {
        Unknown = 0,
        Default = 1,
        Administrator = 2,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AccessControl {
    #[prost(enumeration = "access_control::AccessRequired", optional, tag = "1")]
    pub attributes: Option<i32>,
    #[prost(enumeration = "access_control::AccessRequired", optional, tag = "2")]
    pub members: Option<i32>,
    #[prost(enumeration = "access_control::AccessRequired", optional, tag = "3")]
    pub add_from_invite_link: Option<i32>,
}

pub mod access_control {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum AccessRequired {
        Unknown = 0,
        Any = 1,
        Member = 2,
        Administrator = 3,
        Unsatisfiable = 4,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Group {
    /// Serialized zkgroup `GroupPublicParams`; doubles as the group id.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub title: Option<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub avatar: Option<String>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub disappearing_messages_timer: Option<Vec<u8>>,
    #[prost(message, optional, tag = "5")]
    pub access_control: Option<AccessControl>,
    #[prost(uint32, optional, tag = "6")]
    pub revision: Option<u32>,
    #[prost(message, repeated, tag = "7")]
    pub members: Vec<Member>,
    #[prost(bytes = "vec", optional, tag = "10")]
    pub invite_link_password: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "11")]
    pub description: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupChange {
    /// Serialized `group_change::Actions`.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub actions: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub server_signature: Option<Vec<u8>>,
    #[prost(uint32, optional, tag = "3")]
    pub change_epoch: Option<u32>,
}

pub mod group_change {
    use super::Member;

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Actions {
        #[prost(bytes = "vec", optional, tag = "1")]
        pub source_service_id: Option<Vec<u8>>,
        /// Revision this change produces; must be current revision + 1.
        #[prost(uint32, optional, tag = "2")]
        pub revision: Option<u32>,
        #[prost(message, repeated, tag = "3")]
        pub add_members: Vec<actions::AddMemberAction>,
        #[prost(message, repeated, tag = "4")]
        pub delete_members: Vec<actions::DeleteMemberAction>,
        #[prost(message, optional, tag = "10")]
        pub modify_title: Option<actions::ModifyTitleAction>,
    }

    pub mod actions {
        use crate::proto::groups::Member;

        #[derive(Clone, PartialEq, prost::Message)]
        pub struct AddMemberAction {
            #[prost(message, optional, tag = "1")]
            pub added: Option<Member>,
            #[prost(bool, optional, tag = "2")]
            pub join_from_invite_link: Option<bool>,
        }

        #[derive(Clone, PartialEq, prost::Message)]
        pub struct DeleteMemberAction {
            #[prost(bytes = "vec", optional, tag = "1")]
            pub deleted_user_id: Option<Vec<u8>>,
        }

        #[derive(Clone, PartialEq, prost::Message)]
        pub struct ModifyTitleAction {
            #[prost(bytes = "vec", optional, tag = "1")]
            pub title: Option<Vec<u8>>,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupChanges {
    #[prost(message, repeated, tag = "1")]
    pub group_changes: Vec<group_changes::GroupChangeState>,
}

pub mod group_changes {
    use super::{Group, GroupChange};

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GroupChangeState {
        #[prost(message, optional, tag = "1")]
        pub group_change: Option<GroupChange>,
        #[prost(message, optional, tag = "2")]
        pub group_state: Option<Group>,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GroupChangeResponse {
    #[prost(message, optional, tag = "1")]
    pub group_change: Option<GroupChange>,
}
