//! Response types for the session endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    /// The address this session proved, caller casing preserved.
    pub email: String,
    /// Whether that address is on the allow-list right now.
    pub authorized: bool,
}
