//! Broken rules and their deduplicating collection.

use std::collections::HashSet;

use serde::{Deserialize, Serialize, Serializer};

/// How serious a broken rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// One validation failure on a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenRule {
    property: String,
    message: String,
    #[serde(default)]
    severity: Severity,
}

impl BrokenRule {
    /// Creates an error-level broken rule.
    pub fn new(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// Creates a warning-level broken rule.
    pub fn warning(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::new(property, message)
        }
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the normalized `PROPERTY:MESSAGE` identity of this rule.
    ///
    /// Case and whitespace are ignored, so `" name : Required "` and
    /// `"NAME:required"` collide.
    pub fn key(&self) -> String {
        format!("{}:{}", normalize(&self.property), normalize(&self.message))
    }
}

impl std::fmt::Display for BrokenRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.property, self.message)
    }
}

fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Ordered set of broken rules, deduplicated by normalized key.
///
/// Insertion order is preserved so the same subject state always renders
/// the same list.
#[derive(Debug, Clone, Default)]
pub struct BrokenRuleCollection {
    rules: Vec<BrokenRule>,
    keys: HashSet<String>,
}

impl BrokenRuleCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error-level rule. Returns false if an equivalent rule exists.
    pub fn add(&mut self, property: impl Into<String>, message: impl Into<String>) -> bool {
        self.add_rule(BrokenRule::new(property, message))
    }

    /// Adds a warning-level rule. Returns false if an equivalent rule exists.
    pub fn add_warning(&mut self, property: impl Into<String>, message: impl Into<String>) -> bool {
        self.add_rule(BrokenRule::warning(property, message))
    }

    /// Adds an error-level rule when `broken` is true.
    pub fn add_if(
        &mut self,
        broken: bool,
        property: impl Into<String>,
        message: impl Into<String>,
    ) -> bool {
        broken && self.add(property, message)
    }

    /// Adds a prebuilt rule. The first occurrence of a key wins.
    pub fn add_rule(&mut self, rule: BrokenRule) -> bool {
        if self.keys.insert(rule.key()) {
            self.rules.push(rule);
            true
        } else {
            false
        }
    }

    /// Merges every rule of `other` into this collection.
    pub fn merge(&mut self, other: &BrokenRuleCollection) {
        for rule in &other.rules {
            self.add_rule(rule.clone());
        }
    }

    pub fn contains(&self, property: &str, message: &str) -> bool {
        self.keys.contains(&BrokenRule::new(property, message).key())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BrokenRule> {
        self.rules.iter()
    }

    /// Returns the error-level rules.
    pub fn errors(&self) -> impl Iterator<Item = &BrokenRule> {
        self.rules.iter().filter(|r| r.severity == Severity::Error)
    }

    /// Returns the warning-level rules.
    pub fn warnings(&self) -> impl Iterator<Item = &BrokenRule> {
        self.rules.iter().filter(|r| r.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// Returns the rules broken on one property.
    pub fn for_property<'a>(&'a self, property: &'a str) -> impl Iterator<Item = &'a BrokenRule> {
        let wanted = normalize(property);
        self.rules
            .iter()
            .filter(move |r| normalize(&r.property) == wanted)
    }

    /// Renders each rule as `property: message`.
    pub fn messages(&self) -> Vec<String> {
        self.rules.iter().map(ToString::to_string).collect()
    }

    pub fn clear(&mut self) {
        self.rules.clear();
        self.keys.clear();
    }

    pub fn into_vec(self) -> Vec<BrokenRule> {
        self.rules
    }
}

impl PartialEq for BrokenRuleCollection {
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl Eq for BrokenRuleCollection {}

impl Serialize for BrokenRuleCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.rules.serialize(serializer)
    }
}

impl FromIterator<BrokenRule> for BrokenRuleCollection {
    fn from_iter<I: IntoIterator<Item = BrokenRule>>(iter: I) -> Self {
        let mut collection = Self::new();
        for rule in iter {
            collection.add_rule(rule);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a BrokenRuleCollection {
    type Item = &'a BrokenRule;
    type IntoIter = std::slice::Iter<'a, BrokenRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_rule_is_suppressed() {
        let mut rules = BrokenRuleCollection::new();
        assert!(rules.add("name", "Name is required"));
        assert!(!rules.add("name", "Name is required"));
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_dedup_ignores_case_and_whitespace() {
        let mut rules = BrokenRuleCollection::new();
        rules.add("name", "Name is required");
        assert!(!rules.add(" NAME ", "name  is REQUIRED"));
        assert!(!rules.add("Name", "Nameisrequired"));
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.iter().next().unwrap().property(), "name");
    }

    #[test]
    fn test_different_messages_are_kept_in_order() {
        let mut rules = BrokenRuleCollection::new();
        rules.add("price", "Price must be positive");
        rules.add("name", "Name is required");
        rules.add("price", "Price is too high");
        let properties: Vec<_> = rules.iter().map(BrokenRule::property).collect();
        assert_eq!(properties, vec!["price", "name", "price"]);
    }

    #[test]
    fn test_add_if_only_adds_when_broken() {
        let mut rules = BrokenRuleCollection::new();
        assert!(!rules.add_if(false, "name", "Name is required"));
        assert!(rules.is_empty());
        assert!(rules.add_if(true, "name", "Name is required"));
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn test_merge_deduplicates_across_collections() {
        let mut a = BrokenRuleCollection::new();
        a.add("name", "Name is required");
        let mut b = BrokenRuleCollection::new();
        b.add("NAME", "name is required");
        b.add("sku", "SKU is required");

        a.merge(&b);
        assert_eq!(a.len(), 2);
        assert!(a.contains("sku", "SKU is required"));
    }

    #[test]
    fn test_severity_split() {
        let mut rules = BrokenRuleCollection::new();
        rules.add("name", "Name is required");
        rules.add_warning("description", "Description is short");

        assert_eq!(rules.errors().count(), 1);
        assert_eq!(rules.warnings().count(), 1);
        assert!(rules.has_errors());

        let mut only_warnings = BrokenRuleCollection::new();
        only_warnings.add_warning("description", "Description is short");
        assert!(!only_warnings.has_errors());
        assert!(!only_warnings.is_empty());
    }

    #[test]
    fn test_for_property_and_messages() {
        let rules: BrokenRuleCollection = vec![
            BrokenRule::new("price", "Price must be positive"),
            BrokenRule::new("name", "Name is required"),
        ]
        .into_iter()
        .collect();

        assert_eq!(rules.for_property("PRICE").count(), 1);
        assert_eq!(
            rules.messages(),
            vec!["price: Price must be positive", "name: Name is required"]
        );
    }

    #[test]
    fn test_serializes_as_list_of_rules() {
        let mut rules = BrokenRuleCollection::new();
        rules.add("name", "Name is required");
        let json = serde_json::to_value(&rules).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                { "property": "name", "message": "Name is required", "severity": "Error" }
            ])
        );
    }

    #[test]
    fn test_clear_resets_keys() {
        let mut rules = BrokenRuleCollection::new();
        rules.add("name", "Name is required");
        rules.clear();
        assert!(rules.is_empty());
        assert!(rules.add("name", "Name is required"));
    }
}
