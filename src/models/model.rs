use serde::{Deserialize, Serialize};

/// One entry from the service's model listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatModel {
    pub id: String,
    pub display_name: String,
    pub websearch: bool,
    pub multimodal: bool,
}
