use std::collections::HashMap;

/// Title/body pair handed to the push sink.
#[derive(Debug, Clone)]
pub struct PushNote {
    pub title: String,
    pub body: String,
}

/// Opaque key/value payload delivered alongside a push note.
pub type PushData = HashMap<String, String>;
