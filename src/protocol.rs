use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One server push on the query stream. The `type` field selects the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token {
        content: String,
    },
    Citations {
        sources: Vec<Citation>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence_score: Option<f64>,
    },
    Done {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        confidence_score: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context_used: Option<bool>,
    },
    Error {
        message: String,
    },
}

impl StreamEvent {
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// A source reference attached to an answer.
///
/// The payload shape belongs to the backend, so it is kept as raw JSON and
/// forwarded untouched. The accessors only read fields the backend is known
/// to send and return `None` for anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Citation(pub Value);

impl Citation {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    pub fn index(&self) -> Option<u64> {
        self.0.get("index").and_then(Value::as_u64)
    }

    pub fn document_id(&self) -> Option<&str> {
        self.str_field("document_id")
    }

    pub fn document_title(&self) -> Option<&str> {
        self.str_field("document_title")
    }

    pub fn excerpt(&self) -> Option<&str> {
        self.str_field("text")
    }

    pub fn page_number(&self) -> Option<u64> {
        self.0.get("page_number").and_then(Value::as_u64)
    }

    pub fn similarity_score(&self) -> Option<f64> {
        self.0.get("similarity_score").and_then(Value::as_f64)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// What the caller asks for. Addressing details live in [`StreamParams`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    pub space_id: Option<String>,
    pub persist: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            space_id: None,
            persist: false,
        }
    }

    pub fn in_space(mut self, space_id: impl Into<String>) -> Self {
        self.space_id = Some(space_id.into());
        self
    }

    pub fn persisted(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

/// Everything needed to open one stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamParams {
    pub query: String,
    pub space_id: Option<String>,
    pub user_id: Option<String>,
    pub persist: bool,
    pub token: String,
}

impl StreamParams {
    pub fn new(request: &QueryRequest, token: String, user_id: Option<String>) -> Self {
        Self {
            query: request.query.clone(),
            space_id: request.space_id.clone(),
            user_id,
            persist: request.persist,
            token,
        }
    }

    /// Query-string pairs for the stream URL. The token is only included
    /// when the transport authenticates through the URL.
    pub fn query_pairs(&self, include_token: bool) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("query", self.query.clone())];
        if let Some(space_id) = &self.space_id {
            pairs.push(("space_id", space_id.clone()));
        }
        if let Some(user_id) = &self.user_id {
            pairs.push(("user_id", user_id.clone()));
        }
        if self.persist {
            pairs.push(("save", "true".to_string()));
        }
        if include_token {
            pairs.push(("token", self.token.clone()));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_each_event_type() {
        let token = StreamEvent::parse(r#"{"type":"token","content":"The "}"#).unwrap();
        assert_eq!(
            token,
            StreamEvent::Token {
                content: "The ".to_string()
            }
        );

        let citations = StreamEvent::parse(
            r#"{"type":"citations","sources":[{"id":"doc-1"}],"confidence_score":0.8}"#,
        )
        .unwrap();
        match citations {
            StreamEvent::Citations {
                sources,
                confidence_score,
            } => {
                assert_eq!(sources, vec![Citation::new(json!({"id": "doc-1"}))]);
                assert_eq!(confidence_score, Some(0.8));
            }
            other => panic!("expected citations, got {other:?}"),
        }

        let done = StreamEvent::parse(r#"{"type":"done","context_used":true}"#).unwrap();
        assert_eq!(
            done,
            StreamEvent::Done {
                confidence_score: None,
                query_id: None,
                context_used: Some(true),
            }
        );
        assert!(done.is_terminal());

        let error = StreamEvent::parse(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert!(error.is_terminal());
    }

    #[test]
    fn rejects_unknown_type_and_bad_json() {
        assert!(StreamEvent::parse(r#"{"type":"progress","pct":10}"#).is_err());
        assert!(StreamEvent::parse("not json").is_err());
        assert!(StreamEvent::parse(r#"{"content":"missing type"}"#).is_err());
    }

    #[test]
    fn citation_accessors_read_backend_fields() {
        let citation = Citation::new(json!({
            "index": 1,
            "text": "Revenue grew 12%.",
            "document_id": "3f1c",
            "document_title": "Annual report",
            "page_number": 4,
            "similarity_score": 0.8123
        }));

        assert_eq!(citation.index(), Some(1));
        assert_eq!(citation.document_id(), Some("3f1c"));
        assert_eq!(citation.document_title(), Some("Annual report"));
        assert_eq!(citation.excerpt(), Some("Revenue grew 12%."));
        assert_eq!(citation.page_number(), Some(4));
        assert_eq!(citation.similarity_score(), Some(0.8123));
        assert_eq!(Citation::new(json!("opaque")).document_id(), None);
    }

    #[test]
    fn query_pairs_skip_absent_fields() {
        let request = QueryRequest::new("what is 42?");
        let params = StreamParams::new(&request, "secret".to_string(), None);
        assert_eq!(
            params.query_pairs(false),
            vec![("query", "what is 42?".to_string())]
        );

        let request = QueryRequest::new("q").in_space("space-1").persisted(true);
        let params = StreamParams::new(&request, "secret".to_string(), Some("user-7".into()));
        assert_eq!(
            params.query_pairs(true),
            vec![
                ("query", "q".to_string()),
                ("space_id", "space-1".to_string()),
                ("user_id", "user-7".to_string()),
                ("save", "true".to_string()),
                ("token", "secret".to_string()),
            ]
        );
    }
}
