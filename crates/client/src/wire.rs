//! Feishu open-API response envelope parsing.
//!
//! Every endpoint wraps its payload in `{code, msg, data}` where a zero code
//! means success. A non-zero code, missing payload, or undecodable body all
//! map to [`ClientError`] so the driver sees one failure shape.

use serde::Deserialize;

use lark_common::error::ClientError;

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    data: Option<T>,
}

#[derive(Debug, Default, Deserialize)]
struct ReadUsersData {
    #[serde(default)]
    items: Vec<ReadUser>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadUser {
    #[serde(default)]
    user_id: String,
}

/// One page of the read-users listing.
#[derive(Debug, PartialEq, Eq)]
pub struct ReadUsersPage {
    pub user_ids: Vec<String>,
    /// Token for the next page, present only when the listing continues.
    pub next_page_token: Option<String>,
}

fn envelope<'a, T: Deserialize<'a> + Default>(body: &'a str) -> Result<T, ClientError> {
    let envelope: ApiEnvelope<T> =
        serde_json::from_str(body).map_err(|e| ClientError::Malformed(e.to_string()))?;
    if envelope.code != 0 {
        return Err(ClientError::Platform(envelope.code));
    }
    Ok(envelope.data.unwrap_or_default())
}

/// Parse a read-users response body into reader ids plus paging state.
///
/// An empty item list on a zero code is a valid result — nobody has read the
/// message yet.
pub fn parse_read_users(body: &str) -> Result<ReadUsersPage, ClientError> {
    let data: ReadUsersData = envelope(body)?;

    let user_ids = data
        .items
        .into_iter()
        .map(|item| item.user_id)
        .filter(|id| !id.is_empty())
        .collect();

    let next_page_token = match (data.has_more, data.page_token) {
        (true, Some(token)) if !token.is_empty() => Some(token),
        _ => None,
    };

    Ok(ReadUsersPage {
        user_ids,
        next_page_token,
    })
}

/// Parse a bare acknowledgement response; success is exactly code 0.
pub fn parse_ack(body: &str) -> Result<(), ClientError> {
    envelope::<serde_json::Value>(body).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_read_users_single_page() {
        let body = r#"{
            "code": 0,
            "msg": "success",
            "data": {
                "items": [
                    {"user_id": "ou_user1", "timestamp": "1609484184"},
                    {"user_id": "ou_user2", "timestamp": "1609484185"}
                ],
                "has_more": false,
                "page_token": ""
            }
        }"#;
        let page = parse_read_users(body).unwrap();
        assert_eq!(page.user_ids, vec!["ou_user1", "ou_user2"]);
        assert_eq!(page.next_page_token, None);
    }

    #[test]
    fn test_parse_read_users_empty_is_valid() {
        let body = r#"{"code": 0, "msg": "success", "data": {"items": [], "has_more": false}}"#;
        let page = parse_read_users(body).unwrap();
        assert!(page.user_ids.is_empty());
        assert_eq!(page.next_page_token, None);
    }

    #[test]
    fn test_parse_read_users_missing_data_is_valid() {
        let body = r#"{"code": 0, "msg": "success"}"#;
        let page = parse_read_users(body).unwrap();
        assert!(page.user_ids.is_empty());
    }

    #[test]
    fn test_parse_read_users_follows_paging() {
        let body = r#"{
            "code": 0,
            "msg": "success",
            "data": {
                "items": [{"user_id": "ou_user1"}],
                "has_more": true,
                "page_token": "pt_next"
            }
        }"#;
        let page = parse_read_users(body).unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("pt_next"));
    }

    #[test]
    fn test_parse_read_users_skips_blank_ids() {
        let body = r#"{
            "code": 0,
            "data": {"items": [{"user_id": ""}, {"user_id": "ou_user1"}], "has_more": false}
        }"#;
        let page = parse_read_users(body).unwrap();
        assert_eq!(page.user_ids, vec!["ou_user1"]);
    }

    #[test]
    fn test_nonzero_code_is_platform_error() {
        let body = r#"{"code": 99991663, "msg": "token invalid"}"#;
        match parse_read_users(body) {
            Err(ClientError::Platform(code)) => assert_eq!(code, 99991663),
            other => panic!("expected platform error, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        assert!(matches!(
            parse_read_users("<html>gateway timeout</html>"),
            Err(ClientError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_ack() {
        assert!(parse_ack(r#"{"code": 0, "msg": "success", "data": {}}"#).is_ok());
        assert!(matches!(
            parse_ack(r#"{"code": 230001, "msg": "urgent limit"}"#),
            Err(ClientError::Platform(230001))
        ));
    }
}
