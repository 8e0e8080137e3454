//! Storage service records (`StorageService.proto`).

#[derive(Clone, PartialEq, prost::Message)]
pub struct StorageManifest {
    #[prost(uint64, optional, tag = "1")]
    pub version: Option<u64>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StorageItem {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub key: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StorageItems {
    #[prost(message, repeated, tag = "1")]
    pub items: Vec<StorageItem>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ReadOperation {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub read_key: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WriteOperation {
    #[prost(message, optional, tag = "1")]
    pub manifest: Option<StorageManifest>,
    #[prost(message, repeated, tag = "2")]
    pub insert_item: Vec<StorageItem>,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub delete_key: Vec<Vec<u8>>,
    #[prost(bool, optional, tag = "4")]
    pub clear_all: Option<bool>,
}
