use contract::Contract;
use dashmap::DashMap;
use pipeline::{Frame, Guard, GuardResult, Transform};
use std::sync::Arc;

/// Resolves a pub/sub topic to a `(device, data-item)` pair via the ordered
/// lookup strategies of §4.4.1, caching hits by topic string.
pub struct TopicRouter {
    contract: Arc<dyn Contract>,
    default_device: String,
    cache: DashMap<String, (Option<String>, Option<String>)>,
}

impl TopicRouter {
    pub fn new(contract: Arc<dyn Contract>, default_device: impl Into<String>) -> Self {
        TopicRouter {
            contract,
            default_device: default_device.into(),
            cache: DashMap::new(),
        }
    }

    pub fn resolve(&self, topic: &str) -> (Option<String>, Option<String>) {
        if let Some(hit) = self.cache.get(topic) {
            return hit.clone();
        }
        let resolved = self.resolve_uncached(topic);
        self.cache.insert(topic.to_string(), resolved.clone());
        resolved
    }

    fn resolve_uncached(&self, topic: &str) -> (Option<String>, Option<String>) {
        let path: Vec<&str> = topic.split('/').filter(|s| !s.is_empty()).collect();

        if path.len() >= 2 {
            if self.contract.find_data_item(path[0], path[1]).is_some() {
                return (Some(path[0].to_string()), Some(path[1].to_string()));
            }
        }

        if self.contract.find_data_item(&self.default_device, topic).is_some() {
            return (Some(self.default_device.clone()), Some(topic.to_string()));
        }

        if let Some(last) = path.last() {
            if self.contract.find_data_item(&self.default_device, last).is_some() {
                return (Some(self.default_device.clone()), Some(last.to_string()));
            }
        }

        for segment in &path {
            if let Some(device) = self.contract.find_device(segment) {
                for candidate in &path {
                    if self.contract.find_data_item(&device.uuid, candidate).is_some() {
                        return (Some(device.uuid), Some(candidate.to_string()));
                    }
                }
                return (Some(device.uuid), None);
            }
        }

        (None, None)
    }
}

impl Transform<Frame> for TopicRouter {
    fn name(&self) -> &str {
        "topic_router"
    }

    fn guard(&self) -> Guard<Frame> {
        Guard::new(|f: &Frame| match f {
            Frame::TopicMessage { .. } => GuardResult::Run,
            _ => GuardResult::Continue,
        })
    }

    fn apply(&self, input: Frame) -> Option<Frame> {
        match input {
            Frame::TopicMessage { topic, body } => {
                let (device, data_item) = self.resolve(&topic);
                let trimmed = body.trim_start();
                if trimmed.starts_with('{') || trimmed.starts_with('[') {
                    Some(Frame::JsonMessage {
                        device,
                        data_item,
                        body,
                    })
                } else {
                    Some(Frame::DataMessage {
                        device,
                        data_item,
                        body,
                    })
                }
            }
            other => Some(other),
        }
    }
}
