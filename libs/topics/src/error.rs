use thiserror::Error;

#[derive(Debug, Error)]
pub enum TopicError {
    #[error("malformed JSON body: {0}")]
    MalformedJson(String),
    #[error("topic `{0}` did not resolve to any device or data item")]
    UnresolvedTopic(String),
}
