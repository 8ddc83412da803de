use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub enum Command {
    /// Hand the next sequential token of `date` to `visit_id`
    AllocateToken { date: String, visit_id: String },
}
