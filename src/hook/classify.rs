//! Detection of GraphQL calls among outgoing requests.

use serde_json::{Map, Value};

use super::http::HttpRequest;
use crate::domain::UNKNOWN_OPERATION;

/// Path fragment a request URL must contain to be considered GraphQL traffic.
pub const GRAPHQL_PATH: &str = "/graphql";

/// A request recognized as a GraphQL operation.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphQLCall {
    pub operation_name: String,
    pub query: Option<String>,
    pub variables: Option<Map<String, Value>>,
    pub url: String,
}

/// Classifies a request.
///
/// A request is GraphQL when its URL contains `/graphql`, its method is POST and its body is
/// a JSON object carrying `query` or `operationName`. Anything else, including bodies that
/// fail to parse, yields `None`.
pub fn classify(request: &HttpRequest) -> Option<GraphQLCall> {
    if !request.url.contains(GRAPHQL_PATH) || !request.method.eq_ignore_ascii_case("POST") {
        return None;
    }

    let body = request.body.as_deref()?;
    let Ok(Value::Object(body)) = serde_json::from_str::<Value>(body) else {
        return None;
    };
    if !body.contains_key("query") && !body.contains_key("operationName") {
        return None;
    }

    let operation_name = body
        .get("operationName")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(UNKNOWN_OPERATION);

    Some(GraphQLCall {
        operation_name: operation_name.to_string(),
        query: body.get("query").and_then(Value::as_str).map(String::from),
        variables: body.get("variables").and_then(Value::as_object).cloned(),
        url: request.url.clone(),
    })
}
