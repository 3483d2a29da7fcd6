use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::LogicalService;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Successful call as handed to the query-cache layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    /// Sent as multipart/form-data; rebuilt for every attempt
    Form(Vec<FormPart>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub content: FormContent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormContent {
    Text(String),
    File {
        file_name: String,
        mime: Option<String>,
        bytes: Vec<u8>,
    },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: FormContent::Text(value.into()),
        }
    }

    pub fn file(name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content: FormContent::File {
                file_name: file_name.into(),
                mime: None,
                bytes,
            },
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        if let FormContent::File { mime: slot, .. } = &mut self.content {
            *slot = Some(mime.into());
        }
        self
    }
}

/// Everything needed to perform one logical call
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub path: String,
    pub service: LogicalService,
    pub method: Method,
    pub body: RequestBody,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// Overrides the default JSON content type
    pub content_type: Option<String>,
    /// False for bodies the HTTP layer must frame itself (multipart)
    pub json: bool,
    pub skip_auth: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, service: impl Into<LogicalService>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            service: service.into(),
            method,
            body: RequestBody::Empty,
            query: Vec::new(),
            headers: Vec::new(),
            content_type: None,
            json: true,
            skip_auth: false,
        }
    }

    pub fn get(service: impl Into<LogicalService>, path: impl Into<String>) -> Self {
        Self::new(Method::GET, service, path)
    }

    pub fn post(service: impl Into<LogicalService>, path: impl Into<String>) -> Self {
        Self::new(Method::POST, service, path)
    }

    pub fn put(service: impl Into<LogicalService>, path: impl Into<String>) -> Self {
        Self::new(Method::PUT, service, path)
    }

    pub fn patch(service: impl Into<LogicalService>, path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, service, path)
    }

    pub fn delete(service: impl Into<LogicalService>, path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, service, path)
    }

    pub fn json_body(mut self, body: impl Into<Value>) -> Self {
        self.body = RequestBody::Json(body.into());
        self.json = true;
        self
    }

    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }

    pub fn bytes_body(mut self, body: Vec<u8>) -> Self {
        self.body = RequestBody::Bytes(body);
        self
    }

    pub fn form(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Form(parts);
        self.json = false;
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Content type to send, if the dispatcher should set one at all
    /// `None` for multipart bodies: the client writes the boundary header
    /// itself, and any value set here would go out as a second Content-Type.
    pub fn effective_content_type(&self) -> Option<&str> {
        if self.is_multipart() {
            return None;
        }
        if let Some(explicit) = &self.content_type {
            return Some(explicit);
        }
        self.json.then_some(JSON_CONTENT_TYPE)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self.body, RequestBody::Form(_))
    }
}
