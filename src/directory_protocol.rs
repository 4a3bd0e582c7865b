use serde::{Deserialize, Serialize};

/// A relay as published in the key directory. The public key is kept
/// in its exported PEM text form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RelayIdentity {
    pub id: u32,
    pub public_key: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum DirectoryRequest {
    Status,

    Register {
        identity: RelayIdentity,
    },

    GetRelays,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum DirectoryResponse {
    Live,
    Ack,
    RelayList(Vec<RelayIdentity>),
}
