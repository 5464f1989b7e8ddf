/// Name of the rule every new subscription starts with.
pub const DEFAULT_RULE_NAME: &str = "$Default";

/// Builds entity addresses under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityAddress {
    base: String,
}

impl EntityAddress {
    /// `https://<namespace>.servicebus.windows.net`
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            base: format!("https://{namespace}.servicebus.windows.net"),
        }
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Any entity path relative to the namespace root.
    pub fn entity(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub fn queue(&self, queue: &str) -> String {
        self.entity(queue)
    }

    pub fn topic(&self, topic: &str) -> String {
        self.entity(topic)
    }

    pub fn subscription(&self, topic: &str, subscription: &str) -> String {
        format!("{}/Subscriptions/{}", self.topic(topic), subscription)
    }

    pub fn subscription_rules(&self, topic: &str, subscription: &str) -> String {
        format!("{}/Rules", self.subscription(topic, subscription))
    }

    pub fn rule(&self, topic: &str, subscription: &str, rule: &str) -> String {
        format!("{}/{}", self.subscription_rules(topic, subscription), rule)
    }
}
