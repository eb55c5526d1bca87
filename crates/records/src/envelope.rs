//! Response envelope returned to every caller.

use serde::{Deserialize, Serialize};

use crate::table::Row;

pub const SUCCESS_CODE: i32 = 0;
pub const FAILURE_CODE: i32 = -1;

/// `{code, msg, data, id?}` response wrapper.
///
/// Fields are private so the failure invariant holds: a failed envelope
/// never carries data and always carries a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    code: i32,
    msg: String,
    #[serde(default)]
    data: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

impl Envelope {
    pub fn success(data: Vec<Row>) -> Self {
        Self {
            code: SUCCESS_CODE,
            msg: "success".to_string(),
            data,
            id: None,
        }
    }

    /// Success tagged with the subject the data was computed for.
    pub fn success_with_id(data: Vec<Row>, id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::success(data)
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        let mut msg = msg.into();
        if msg.trim().is_empty() {
            msg = "unknown error".to_string();
        }
        Self {
            code: FAILURE_CODE,
            msg,
            data: Vec::new(),
            id: None,
        }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn msg(&self) -> &str {
        &self.msg
    }

    pub fn data(&self) -> &[Row] {
        &self.data
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}
