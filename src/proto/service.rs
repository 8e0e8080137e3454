//! Message transport envelope (`SignalService.proto`).

#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(enumeration = "envelope::Type", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(uint64, optional, tag = "5")]
    pub timestamp: Option<u64>,
    #[prost(uint32, optional, tag = "7")]
    pub source_device: Option<u32>,
    #[prost(bytes = "vec", optional, tag = "8")]
    pub content: Option<Vec<u8>>,
    #[prost(string, optional, tag = "9")]
    pub server_guid: Option<String>,
    #[prost(uint64, optional, tag = "10")]
    pub server_timestamp: Option<u64>,
    #[prost(string, optional, tag = "11")]
    pub source_service_id: Option<String>,
    #[prost(bool, optional, tag = "12")]
    pub ephemeral: Option<bool>,
    #[prost(string, optional, tag = "13")]
    pub destination_service_id: Option<String>,
    #[prost(bool, optional, tag = "14")]
    pub urgent: Option<bool>,
    #[prost(string, optional, tag = "15")]
    pub updated_pni: Option<String>,
    #[prost(bool, optional, tag = "16")]
    pub story: Option<bool>,
}

pub mod envelope {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Unknown = 0,
        Ciphertext = 1,
        KeyExchange = 2,
        PrekeyBundle = 3,
        Receipt = 5,
        UnidentifiedSender = 6,
        SenderkeyMessage = 7,
        PlaintextContent = 8,
    }
}
