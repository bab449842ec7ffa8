//! Integration tests for the binary holder encoding.

use std::sync::Arc;

use lattice_props::{
    CodecError, Error, GroupRegistry, HolderId, HolderTree, PropertyGroup, PropertyValue, TargetAddress, Value,
    ValueType, decode_holder, decode_value, encode_holder, encode_value,
};

fn setup() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn node_group() -> Arc<PropertyGroup> {
    PropertyGroup::builder("Node")
        .property("color", ValueType::Color)
        .property("accent", ValueType::Color)
        .property("tint", ValueType::Color)
        .property("shade", ValueType::Color)
        .property("style", ValueType::Object)
        .property("label", ValueType::Text)
        .build()
        .unwrap()
}

fn reference(group: &PropertyGroup, declaring: &str, address: TargetAddress, target: &str) -> PropertyValue {
    PropertyValue::reference(
        group.lookup(declaring).unwrap(),
        address,
        group.lookup(target).unwrap(),
    )
    .unwrap()
}

fn resolved(tree: &HolderTree, group: &PropertyGroup, id: HolderId) -> Vec<Option<Value>> {
    ["color", "accent", "tint", "shade", "label"]
        .iter()
        .map(|name| tree.get(id, &group.key(name).unwrap()).unwrap())
        .collect()
}

#[test]
fn test_holder_round_trip_with_every_address() {
    setup();
    let group = node_group();
    let key = |name: &str| group.key(name).unwrap();

    let tree = HolderTree::new();
    let root = tree.create(group.clone());
    tree.set_value(root, &key("color"), Value::Color(0x102030ff)).unwrap();

    let node = tree.create_child(group.clone(), root).unwrap();
    let style = tree.create_child(group.clone(), node).unwrap();
    tree.set_value(style, &key("color"), Value::Color(0xabcdefff)).unwrap();

    tree.set_value(node, &key("style"), style).unwrap();
    tree.set_value(node, &key("label"), "caption").unwrap();
    tree.set(node, &key("color"), reference(&group, "color", TargetAddress::Parent, "color"))
        .unwrap();
    tree.set(node, &key("accent"), reference(&group, "accent", TargetAddress::This, "color"))
        .unwrap();
    tree.set(
        node,
        &key("tint"),
        reference(
            &group,
            "tint",
            TargetAddress::PropertyObjectProperty(key("style")),
            "color",
        ),
    )
    .unwrap();
    tree.set(
        node,
        &key("shade"),
        reference(
            &group,
            "shade",
            TargetAddress::Composite(vec![
                TargetAddress::PropertyObjectProperty(key("style")),
                TargetAddress::Parent,
            ]),
            "accent",
        ),
    )
    .unwrap();

    let expected = vec![
        Some(Value::Color(0x102030ff)),
        Some(Value::Color(0x102030ff)),
        Some(Value::Color(0xabcdefff)),
        Some(Value::Color(0x102030ff)),
        Some(Value::from("caption")),
    ];
    assert_eq!(resolved(&tree, &group, node), expected);

    let bytes = encode_holder(&tree, node).unwrap();
    let mut groups = GroupRegistry::new();
    groups.register(group.clone());

    let copy = decode_holder(&tree, &groups, Some(root), &bytes).unwrap().unwrap();
    assert_ne!(copy, node);
    assert_eq!(tree.parent(copy).unwrap(), Some(root));
    assert_eq!(resolved(&tree, &group, copy), expected);

    assert_eq!(encode_holder(&tree, copy).unwrap(), bytes);

    // The nested style holder was rebuilt as a child of the copy.
    let copied_style = tree.get(copy, &key("style")).unwrap().and_then(|value| value.as_object());
    let copied_style = copied_style.unwrap();
    assert_ne!(copied_style, style);
    assert_eq!(tree.parent(copied_style).unwrap(), Some(copy));

    // References in the copy are live, not snapshots.
    tree.set_value(copied_style, &key("color"), Value::Color(0x000000ff)).unwrap();
    assert_eq!(tree.get(copy, &key("tint")).unwrap(), Some(Value::Color(0x000000ff)));
    assert_eq!(tree.get(node, &key("tint")).unwrap(), Some(Value::Color(0xabcdefff)));
}

#[test]
fn test_removed_property_name_decodes_as_absent() {
    setup();
    let old = PropertyGroup::builder("Label")
        .property("legacy", ValueType::Int)
        .property("alias", ValueType::Int)
        .property("size", ValueType::Int)
        .build()
        .unwrap();
    let tree = HolderTree::new();
    let label = tree.create(old.clone());
    tree.set_value(label, &old.key("legacy").unwrap(), 3).unwrap();
    tree.set_value(label, &old.key("size").unwrap(), 11).unwrap();
    tree.set(label, &old.key("alias").unwrap(), reference(&old, "alias", TargetAddress::This, "legacy"))
        .unwrap();
    let bytes = encode_holder(&tree, label).unwrap();

    let current = PropertyGroup::builder("Label")
        .property("alias", ValueType::Int)
        .property("size", ValueType::Int)
        .build()
        .unwrap();
    let mut groups = GroupRegistry::new();
    groups.register(current.clone());

    let loaded = decode_holder(&tree, &groups, None, &bytes).unwrap().unwrap();
    assert_eq!(tree.group(loaded).unwrap().name(), "Label");
    assert_eq!(tree.get(loaded, &current.key("size").unwrap()).unwrap(), Some(Value::Int(11)));
    assert_eq!(tree.get_local(loaded, &current.key("alias").unwrap()).unwrap(), None);
}

#[test]
fn test_unknown_group_is_skipped() {
    setup();
    let style_group = PropertyGroup::builder("Style")
        .property_with_default("weight", ValueType::Int, 400)
        .build()
        .unwrap();
    let group = node_group();
    let tree = HolderTree::new();
    let node = tree.create(group.clone());
    let style = tree.create_child(style_group.clone(), node).unwrap();
    tree.set_value(style, &style_group.key("weight").unwrap(), 700).unwrap();
    tree.set_value(node, &group.key("style").unwrap(), style).unwrap();
    tree.set_value(node, &group.key("label").unwrap(), "kept").unwrap();
    let bytes = encode_holder(&tree, node).unwrap();

    // Only the outer group is known to the decoder.
    let mut groups = GroupRegistry::new();
    groups.register(group.clone());
    let before = tree.len();

    let loaded = decode_holder(&tree, &groups, None, &bytes).unwrap().unwrap();
    assert_eq!(tree.len(), before + 1);
    assert_eq!(tree.get(loaded, &group.key("style").unwrap()).unwrap(), None);
    assert_eq!(tree.get(loaded, &group.key("label").unwrap()).unwrap(), Some(Value::from("kept")));

    // An unknown top-level group loads nothing.
    let style_bytes = encode_holder(&tree, style).unwrap();
    assert_eq!(decode_holder(&tree, &groups, None, &style_bytes).unwrap(), None);
    assert_eq!(tree.len(), before + 1);
}

#[test]
fn test_unresolvable_reference_decodes_as_absent() {
    setup();
    let group = node_group();
    let tree = HolderTree::new();
    let parent = tree.create(group.clone());
    let child = tree.create_child(group.clone(), parent).unwrap();
    let value = reference(&group, "color", TargetAddress::Parent, "color");
    let bytes = encode_value(&tree, &value).unwrap();

    let groups = GroupRegistry::new();
    let decl = group.lookup("color").unwrap();
    assert_eq!(decode_value(&tree, &groups, child, decl, &bytes).unwrap(), Some(value));
    // A root has no parent to look the name up on.
    assert_eq!(decode_value(&tree, &groups, parent, decl, &bytes).unwrap(), None);
}

#[test]
fn test_invalid_tag_is_an_error() {
    setup();
    let group = node_group();
    let tree = HolderTree::new();
    let anchor = tree.create(group.clone());
    let decl = group.lookup("label").unwrap();

    let err = decode_value(&tree, &GroupRegistry::new(), anchor, decl, &[0, 0, 0, 2]).unwrap_err();
    assert!(matches!(
        err,
        Error::Codec(CodecError::InvalidEncodingTag {
            context: "property value",
            tag: 2
        })
    ));
    assert_eq!(err.to_string(), "Codec error: Invalid property value tag 2");
}

#[test]
fn test_failed_decode_leaves_no_holder() {
    setup();
    let group = node_group();
    let tree = HolderTree::new();
    let node = tree.create(group.clone());
    let style = tree.create_child(group.clone(), node).unwrap();
    tree.set_value(style, &group.key("label").unwrap(), "inner").unwrap();
    tree.set_value(node, &group.key("style").unwrap(), style).unwrap();
    tree.set_value(node, &group.key("label").unwrap(), "outer").unwrap();
    let bytes = encode_holder(&tree, node).unwrap();

    let mut groups = GroupRegistry::new();
    groups.register(group);
    let before = tree.len();

    let truncated = &bytes[..bytes.len() - 1];
    let err = decode_holder(&tree, &groups, None, truncated).unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::UnexpectedEof { .. })));
    assert_eq!(tree.len(), before);
}

#[test]
fn test_object_cycle_is_unencodable() {
    let group = node_group();
    let tree = HolderTree::new();
    let node = tree.create(group.clone());
    tree.set_value(node, &group.key("style").unwrap(), node).unwrap();

    let err = encode_holder(&tree, node).unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::UnencodableValue(_))));
}
