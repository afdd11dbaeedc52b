//! One JSON object per line on stderr, so CloudWatch and terminals both get
//! greppable events.

use serde_json::{json, Value};

pub fn info(component: &str, event: &str, details: Value) {
    eprintln!("{}", render(component, None, event, details));
}

pub fn warn(component: &str, event: &str, details: Value) {
    eprintln!("{}", render(component, Some("warn"), event, details));
}

pub fn error(component: &str, event: &str, details: Value) {
    eprintln!("{}", render(component, Some("error"), event, details));
}

fn render(component: &str, level: Option<&str>, event: &str, details: Value) -> Value {
    let mut line = json!({
        "component": component,
        "event": event,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "details": details,
    });
    if let (Some(level), Some(object)) = (level, line.as_object_mut()) {
        object.insert("level".to_string(), Value::from(level));
    }
    line
}
