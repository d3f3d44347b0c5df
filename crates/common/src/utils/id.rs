use uuid::Uuid;

/// Generate a request identifier used to correlate log lines of one request
pub fn generate_request_id() -> String {
    format!("req_{}", Uuid::new_v4())
}
