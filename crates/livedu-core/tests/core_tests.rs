use livedu_core::{Node, NodeKind, ScanConfig, ScanEvent, ScanProgress};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_node_kind_discrimination() {
    assert!(NodeKind::File.is_file());
    assert!(!NodeKind::File.is_dir());
    assert!(NodeKind::Directory.is_dir());
    assert!(!NodeKind::Directory.is_file());
}

#[test]
fn test_unexpanded_directory_omits_children() {
    let node = Node::new_directory("pending", "/data/pending");
    let json = serde_json::to_value(&node).unwrap();

    assert_eq!(json["kind"], "directory");
    assert!(json.get("children").is_none());
    assert!(json.get("truncated").is_none());
    assert!(json.get("extension").is_none());
}

#[test]
fn test_empty_directory_keeps_empty_children() {
    let mut node = Node::new_directory("empty", "/data/empty");
    node.children = Some(Vec::new());
    let json = serde_json::to_string(&node).unwrap();
    assert!(json.contains("\"children\":[]"));

    let back: Node = serde_json::from_str(&json).unwrap();
    assert_eq!(back.children, Some(Vec::new()));
}

#[test]
fn test_wire_shape_survives_serialization() {
    let mut deep = Node::new_directory("deep", "/data/deep");
    deep.truncated = true;
    deep.size = 4096;

    let mut root = Node::new_directory("data", "/data");
    root.children = Some(vec![
        deep,
        Node::new_file("notes.TXT", "/data/notes.TXT", 12),
        Node::aggregate(Path::new("/data"), 3, 6),
    ]);
    root.recompute_size();

    let json = serde_json::to_string(&root).unwrap();
    let back: Node = serde_json::from_str(&json).unwrap();

    assert_eq!(back, root);
    assert_eq!(back.size, 4114);
    let deep = back.child("deep").unwrap();
    assert!(deep.truncated);
    assert!(deep.children.is_none());
    assert_eq!(
        back.child("notes.TXT").unwrap().extension.as_deref(),
        Some("txt")
    );
}

#[test]
fn test_find_descendant() {
    let mut sub = Node::new_directory("b", "/x/b");
    sub.children = Some(vec![Node::new_file("c.txt", "/x/b/c.txt", 20)]);
    let mut root = Node::new_directory("x", "/x");
    root.children = Some(vec![Node::new_file("a.txt", "/x/a.txt", 10), sub]);

    assert_eq!(root.find(Path::new("/x/b/c.txt")).unwrap().size, 20);
    assert!(root.find(Path::new("/y")).is_none());
    assert_eq!(root.node_count(), 4);
}

#[test]
fn test_sort_children_by_size() {
    let mut root = Node::new_directory("x", "/x");
    root.children = Some(vec![
        Node::new_file("small", "/x/small", 1),
        Node::new_file("big", "/x/big", 100),
        Node::new_file("mid", "/x/mid", 50),
    ]);
    root.sort_children_by_size();

    let names: Vec<_> = root.children().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["big", "mid", "small"]);
}

#[test]
fn test_config_from_partial_json() {
    let config: ScanConfig =
        serde_json::from_str(r#"{"max_depth": 4, "tick_interval": 250}"#).unwrap();

    assert_eq!(config.max_depth, 4);
    assert_eq!(config.tick_interval, Duration::from_millis(250));
    assert_eq!(config.concurrency, 64);
    assert!(config.include_hidden);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_validate_rejects_zero_children() {
    let mut config = ScanConfig::new();
    config.max_children = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_event_serialization_is_tagged() {
    let tree = Arc::new(Node::new_directory("r", "/r"));
    let event = ScanEvent::progress(tree, ScanProgress::new(3, 1));
    let json = serde_json::to_value(&event).unwrap();

    assert_eq!(json["type"], "progress");
    assert_eq!(json["dirs_found"], 3);
    assert_eq!(json["dirs_completed"], 1);
    assert_eq!(json["tree"]["name"], "r");
}
