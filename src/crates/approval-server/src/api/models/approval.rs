//! Approval API models and DTOs

use serde::{Deserialize, Serialize};

use crate::api::{
    error::ApiResult,
    middleware::validation::{validate_action, validate_not_empty, validate_uuid},
};
use crate::services::Submission;
use hitl_checkpoint::RunId;

/// Query for GET /approvals/poll
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollQuery {
    pub run_id: Option<String>,
}

impl PollQuery {
    pub fn run_id(&self) -> ApiResult<RunId> {
        validate_uuid(validate_not_empty(self.run_id.as_deref(), "run_id")?)
    }
}

/// Body of POST /approvals/remind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindRequest {
    pub run_id: Option<String>,
}

impl RemindRequest {
    pub fn run_id(&self) -> ApiResult<RunId> {
        validate_uuid(validate_not_empty(self.run_id.as_deref(), "run_id")?)
    }
}

/// Decision submission, from the query string (emailed link) or a JSON body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub token: Option<String>,
    pub action: Option<String>,
    /// Rejection reason; `comment` is accepted as an alias
    #[serde(default, alias = "comment")]
    pub reason: Option<String>,
    pub signer: Option<String>,
}

impl SubmitRequest {
    /// Validate and convert into a service submission
    pub fn into_submission(self) -> ApiResult<Submission> {
        let token = validate_not_empty(self.token.as_deref(), "token")?.to_string();
        let action = validate_action(validate_not_empty(self.action.as_deref(), "action")?)?;
        Ok(Submission {
            token,
            action,
            comment: self.reason,
            signer: self.signer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitl_checkpoint::Decision;
    use serde_json::json;

    #[test]
    fn test_submit_request_conversion() {
        let request: SubmitRequest = serde_json::from_value(json!({
            "token": "abc",
            "action": "reject",
            "comment": "Missing documents.",
            "signer": "bob@example.com"
        }))
        .unwrap();
        let submission = request.into_submission().unwrap();
        assert_eq!(submission.token, "abc");
        assert_eq!(submission.action, Decision::Reject);
        assert_eq!(submission.comment.as_deref(), Some("Missing documents."));
    }

    #[test]
    fn test_submit_request_requires_token_and_action() {
        let missing_token = SubmitRequest {
            action: Some("approve".into()),
            ..Default::default()
        };
        assert!(missing_token.into_submission().is_err());

        let bad_action = SubmitRequest {
            token: Some("abc".into()),
            action: Some("maybe".into()),
            ..Default::default()
        };
        assert!(bad_action.into_submission().is_err());
    }

    #[test]
    fn test_poll_query_run_id() {
        let query = PollQuery {
            run_id: Some("not-a-uuid".into()),
        };
        assert!(query.run_id().is_err());
        assert!(PollQuery::default().run_id().is_err());
    }
}
