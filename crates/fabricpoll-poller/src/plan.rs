//! Declarative traversal plans for Redfish resource trees
//!
//! A plan is an ordered list of [`Step`]s applied to the body of the node
//! just read. Each step names how to find child paths in that body and which
//! steps to apply to each child in turn. Supporting another collection type
//! means adding a step, not a new branch in the crawler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Property holding a child's path inside a reference record
pub const ODATA_ID: &str = "@odata.id";

/// How a step locates child paths in a parent body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum Link {
    /// A single child: `body[name]["@odata.id"]` (or `body[name]` as a string)
    Field(String),
    /// Collection members: `body["Members"][i]["@odata.id"]`, bounded by
    /// `Members@odata.count` when the collection reports one
    Members,
    /// Every entry of an embedded reference list: `body[name][i]["@odata.id"]`
    Each(String),
}

impl Link {
    pub fn field(name: &str) -> Self {
        Link::Field(name.to_string())
    }

    pub fn each(name: &str) -> Self {
        Link::Each(name.to_string())
    }

    /// Child paths referenced by `body`, in the order the endpoint reports
    /// them. A missing or malformed reference yields no paths.
    pub fn targets(&self, body: &Value) -> Vec<String> {
        match self {
            Link::Field(name) => match body.get(name) {
                Some(Value::String(path)) => vec![path.clone()],
                Some(reference) => reference_path(reference).into_iter().collect(),
                None => Vec::new(),
            },
            Link::Members => {
                let members = reference_list(body, "Members");
                match body.get("Members@odata.count").and_then(Value::as_u64) {
                    Some(count) => {
                        let count = count as usize;
                        if count > members.len() {
                            warn!(
                                reported = count,
                                listed = members.len(),
                                "Collection reports more members than it lists"
                            );
                        }
                        members.into_iter().take(count).collect()
                    }
                    None => members,
                }
            }
            Link::Each(name) => reference_list(body, name),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Link::Field(name) | Link::Each(name) => name,
            Link::Members => "Members",
        }
    }
}

fn reference_path(reference: &Value) -> Option<String> {
    reference
        .get(ODATA_ID)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn reference_list(body: &Value, name: &str) -> Vec<String> {
    body.get(name)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(reference_path).collect())
        .unwrap_or_default()
}

/// One traversal step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub link: Link,
    /// Placeholder steps are recognized but not followed
    #[serde(default = "default_expand")]
    pub expand: bool,
    #[serde(default)]
    pub children: Vec<Step>,
}

fn default_expand() -> bool {
    true
}

impl Step {
    pub fn new(link: Link) -> Self {
        Self {
            link,
            expand: true,
            children: Vec::new(),
        }
    }

    /// A recognized collection that is not crawled yet
    pub fn placeholder(link: Link) -> Self {
        Self {
            link,
            expand: false,
            children: Vec::new(),
        }
    }

    pub fn then(mut self, child: Step) -> Self {
        self.children.push(child);
        self
    }
}

/// Root path plus the steps applied to the root body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalPlan {
    pub root: String,
    pub steps: Vec<Step>,
}

impl TraversalPlan {
    /// Storage enclosure layout:
    /// `Systems → member → Storage → member → Drives[]`.
    /// `Chassis`, `Managers` and `JsonSchemas` are known but not crawled.
    pub fn redfish_storage() -> Self {
        let drives = Step::new(Link::each("Drives"));
        let storage = Step::new(Link::field("Storage"))
            .then(Step::new(Link::Members).then(drives));
        let systems = Step::new(Link::field("Systems"))
            .then(Step::new(Link::Members).then(storage));

        Self {
            root: fabricpoll_redfish::SERVICE_ROOT.to_string(),
            steps: vec![
                systems,
                Step::placeholder(Link::field("Chassis")),
                Step::placeholder(Link::field("Managers")),
                Step::placeholder(Link::field("JsonSchemas")),
            ],
        }
    }
}
