//! Device provisioning messages (`Provisioning.proto`).

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProvisioningUuid {
    #[prost(string, optional, tag = "1")]
    pub uuid: Option<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProvisionEnvelope {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub public_key: Option<Vec<u8>>,
    /// Encrypted `ProvisionMessage`: version || iv || ciphertext || mac.
    #[prost(bytes = "vec", optional, tag = "2")]
    pub body: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ProvisionMessage {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub aci_identity_key_public: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub aci_identity_key_private: Option<Vec<u8>>,
    #[prost(string, optional, tag = "3")]
    pub number: Option<String>,
    #[prost(string, optional, tag = "4")]
    pub provisioning_code: Option<String>,
    #[prost(string, optional, tag = "5")]
    pub user_agent: Option<String>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub profile_key: Option<Vec<u8>>,
    #[prost(bool, optional, tag = "7")]
    pub read_receipts: Option<bool>,
    #[prost(string, optional, tag = "8")]
    pub aci: Option<String>,
    #[prost(uint32, optional, tag = "9")]
    pub provisioning_version: Option<u32>,
    #[prost(string, optional, tag = "10")]
    pub pni: Option<String>,
    #[prost(bytes = "vec", optional, tag = "11")]
    pub pni_identity_key_public: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "12")]
    pub pni_identity_key_private: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "13")]
    pub master_key: Option<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProvisioningVersion {
    Initial = 0,
    TabletSupport = 1,
}

impl ProvisioningVersion {
    /// Version advertised in freshly minted provision messages.
    pub const CURRENT: ProvisioningVersion = ProvisioningVersion::TabletSupport;
}
