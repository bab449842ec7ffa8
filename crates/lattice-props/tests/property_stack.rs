//! Integration tests for layered stacks, holders and references.

use std::sync::Arc;
use std::time::Duration;

use lattice_props::{
    HolderEvent, HolderId, HolderTree, Layer, MapStack, PropertyGroup, PropertyKey, PropertyValue, StackEvent,
    Subscription, SweeperBuilder, TargetAddress, Value, ValueType,
};
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn widget_group() -> Arc<PropertyGroup> {
    PropertyGroup::builder("Widget")
        .property_with_default("padding", ValueType::Int, 4)
        .property("color", ValueType::Color)
        .property("opacity", ValueType::Float)
        .build()
        .unwrap()
}

fn key(group: &PropertyGroup, name: &str) -> PropertyKey {
    group.key(name).unwrap()
}

type Recorded = Arc<Mutex<Vec<HolderEvent>>>;

fn record(tree: &HolderTree, id: HolderId) -> (Subscription<HolderEvent>, Recorded) {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let subscription = tree
        .subscribe(id, move |event: &HolderEvent| sink.lock().push(event.clone()))
        .unwrap();
    (subscription, events)
}

#[test]
fn test_theme_overlay_shared_by_holders() {
    setup();
    let group = widget_group();
    let padding = key(&group, "padding");
    let color = key(&group, "color");

    let tree = HolderTree::new();
    let first = tree.create(group.clone());
    let second = tree.create(group.clone());
    let (_first_sub, first_events) = record(&tree, first);
    let (_second_sub, second_events) = record(&tree, second);

    let theme = Layer::named("dark");
    theme.set(color.clone(), PropertyValue::simple(Value::Color(0x101010ff)));
    tree.add_overlay(first, theme.clone()).unwrap();
    tree.add_overlay(second, theme.clone()).unwrap();

    // A local value on the second holder shadows the theme.
    tree.set_value(second, &padding, 8).unwrap();
    first_events.lock().clear();
    second_events.lock().clear();

    theme.update([
        (color.clone(), Some(PropertyValue::simple(Value::Color(0x000000ff)))),
        (padding.clone(), Some(PropertyValue::simple(16))),
    ]);

    let first_events = first_events.lock();
    assert_eq!(first_events.len(), 1);
    let event = &first_events[0];
    assert_eq!(event.len(), 2);
    assert_eq!(event.get(&padding).unwrap().old, Some(Value::Int(4)));
    assert_eq!(event.get(&padding).unwrap().new, Some(Value::Int(16)));
    assert_eq!(event.get(&color).unwrap().new, Some(Value::Color(0x000000ff)));

    let second_events = second_events.lock();
    assert_eq!(second_events.len(), 1);
    assert!(!second_events[0].contains(&padding));
    assert!(second_events[0].contains(&color));

    assert_eq!(tree.get(first, &padding).unwrap(), Some(Value::Int(16)));
    assert_eq!(tree.get(second, &padding).unwrap(), Some(Value::Int(8)));
}

#[test]
fn test_overlay_removal_restores_defaults() {
    setup();
    let group = widget_group();
    let padding = key(&group, "padding");

    let tree = HolderTree::new();
    let holder = tree.create(group.clone());
    let theme = Layer::new();
    theme.set(padding.clone(), PropertyValue::simple(20));
    tree.add_overlay(holder, theme.clone()).unwrap();
    let (_sub, events) = record(&tree, holder);

    assert!(tree.remove_overlay(holder, &theme).unwrap());
    assert!(!tree.remove_overlay(holder, &theme).unwrap());
    assert!(!tree.remove_overlay(holder, &tree.own_layer(holder).unwrap()).unwrap());

    let events = events.lock();
    assert_eq!(events.len(), 1);
    let change = events[0].get(&padding).unwrap();
    assert_eq!(change.old, Some(Value::Int(20)));
    assert_eq!(change.new, Some(Value::Int(4)));
}

#[test]
fn test_stack_shadowing_round_trip() {
    setup();
    let group = widget_group();
    let padding = key(&group, "padding");

    let top = Layer::named("top");
    let bottom = Layer::named("bottom");
    bottom.set(padding.clone(), PropertyValue::simple(1));
    let stack = MapStack::with_layers([top.clone(), bottom.clone()]);

    let events = Arc::new(Mutex::new(Vec::<StackEvent>::new()));
    let sink = events.clone();
    let _sub = stack
        .changes()
        .subscribe_scoped(move |event: &StackEvent| sink.lock().push(event.clone()));

    top.set(padding.clone(), PropertyValue::simple(2));
    bottom.set(padding.clone(), PropertyValue::simple(3));
    top.remove(&padding);

    let events = events.lock();
    assert_eq!(events.len(), 2, "the shadowed write is silent");
    assert_eq!(events[0].get(&padding).unwrap().old, Some(PropertyValue::simple(1)));
    assert_eq!(events[0].get(&padding).unwrap().new, Some(PropertyValue::simple(2)));
    assert_eq!(events[1].get(&padding).unwrap().old, Some(PropertyValue::simple(2)));
    assert_eq!(events[1].get(&padding).unwrap().new, Some(PropertyValue::simple(3)));
    assert_eq!(stack.effective(&padding), Some(PropertyValue::simple(3)));
}

#[test]
fn test_batched_update_reports_only_visible_keys() {
    setup();
    let group = widget_group();
    let padding = key(&group, "padding");
    let color = key(&group, "color");
    let opacity = key(&group, "opacity");

    let top = Layer::new();
    let bottom = Layer::new();
    top.set(color.clone(), PropertyValue::simple(Value::Color(1)));
    bottom.set(opacity.clone(), PropertyValue::simple(0.5));
    let stack = MapStack::with_layers([top.clone(), bottom.clone()]);

    let events = Arc::new(Mutex::new(Vec::<StackEvent>::new()));
    let sink = events.clone();
    let _sub = stack
        .changes()
        .subscribe_scoped(move |event: &StackEvent| sink.lock().push(event.clone()));

    bottom.update([
        // Shadowed by the top layer.
        (color.clone(), Some(PropertyValue::simple(Value::Color(2)))),
        // Rewrites the same value.
        (opacity.clone(), Some(PropertyValue::simple(0.5))),
        (padding.clone(), Some(PropertyValue::simple(9))),
    ]);

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].keys().cloned().collect::<Vec<_>>(), vec![padding]);
}

#[test]
fn test_reference_default_chain() {
    setup();
    let group = widget_group();
    let color = key(&group, "color");
    let decl = group.decl(&color).unwrap();

    let tree = HolderTree::new();
    let window = tree.create(group.clone());
    let panel = tree.create_child(group.clone(), window).unwrap();

    let fallback = PropertyValue::simple(Value::Color(0xffffffff));
    let inherit = PropertyValue::reference_with_parent(decl, TargetAddress::Parent, decl, fallback).unwrap();
    tree.set(panel, &color, inherit).unwrap();
    let (_sub, events) = record(&tree, panel);

    assert_eq!(tree.get(panel, &color).unwrap(), Some(Value::Color(0xffffffff)));

    tree.set_value(window, &color, Value::Color(0x336699ff)).unwrap();
    assert_eq!(tree.get(panel, &color).unwrap(), Some(Value::Color(0x336699ff)));

    tree.unset(window, &color).unwrap();
    assert_eq!(tree.get(panel, &color).unwrap(), Some(Value::Color(0xffffffff)));

    let events = events.lock();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].get(&color).unwrap().old, Some(Value::Color(0xffffffff)));
    assert_eq!(events[0].get(&color).unwrap().new, Some(Value::Color(0x336699ff)));
    assert_eq!(events[1].get(&color).unwrap().new, Some(Value::Color(0xffffffff)));
}

#[test]
fn test_incompatible_reference_is_rejected() {
    let group = widget_group();
    let color = group.lookup("color").unwrap();
    let opacity = group.lookup("opacity").unwrap();
    let padding = group.lookup("padding").unwrap();

    assert!(PropertyValue::reference(color, TargetAddress::This, opacity).is_err());
    // Ints widen to floats, not the other way round.
    assert!(PropertyValue::reference(opacity, TargetAddress::This, padding).is_ok());
    assert!(PropertyValue::reference(padding, TargetAddress::This, opacity).is_err());
}

#[test]
fn test_reparenting_rebinds_references() {
    setup();
    let group = widget_group();
    let color = key(&group, "color");
    let decl = group.decl(&color).unwrap();

    let tree = HolderTree::new();
    let light = tree.create(group.clone());
    let dark = tree.create(group.clone());
    tree.set_value(light, &color, Value::Color(0xeeeeeeff)).unwrap();
    tree.set_value(dark, &color, Value::Color(0x111111ff)).unwrap();

    let label = tree.create_child(group.clone(), light).unwrap();
    tree.set(
        label,
        &color,
        PropertyValue::reference(decl, TargetAddress::Parent, decl).unwrap(),
    )
    .unwrap();
    let (_sub, events) = record(&tree, label);

    tree.set_parent(label, Some(dark)).unwrap();
    assert_eq!(tree.parent(label).unwrap(), Some(dark));
    assert_eq!(tree.get(label, &color).unwrap(), Some(Value::Color(0x111111ff)));

    // The old parent no longer drives the label.
    tree.set_value(light, &color, Value::Color(0xffffffff)).unwrap();
    tree.set_value(dark, &color, Value::Color(0x000000ff)).unwrap();

    tree.set_parent(label, None).unwrap();
    assert_eq!(tree.get(label, &color).unwrap(), None);

    let events = events.lock();
    let news: Vec<_> = events.iter().map(|event| event.get(&color).unwrap().new.clone()).collect();
    assert_eq!(
        news,
        vec![
            Some(Value::Color(0x111111ff)),
            Some(Value::Color(0x000000ff)),
            None,
        ]
    );
    assert_eq!(events[0].get(&color).unwrap().old, Some(Value::Color(0xeeeeeeff)));
}

#[test]
fn test_object_property_address() {
    setup();
    let group = PropertyGroup::builder("Node")
        .property("color", ValueType::Color)
        .property("style", ValueType::Object)
        .build()
        .unwrap();
    let color = key(&group, "color");
    let style = key(&group, "style");
    let color_decl = group.decl(&color).unwrap();

    let tree = HolderTree::new();
    let node = tree.create(group.clone());
    let first_style = tree.create_child(group.clone(), node).unwrap();
    let second_style = tree.create_child(group.clone(), node).unwrap();
    tree.set_value(first_style, &color, Value::Color(1)).unwrap();
    tree.set_value(second_style, &color, Value::Color(2)).unwrap();

    tree.set_value(node, &style, first_style).unwrap();
    tree.set(
        node,
        &color,
        PropertyValue::reference(color_decl, TargetAddress::PropertyObjectProperty(style.clone()), color_decl)
            .unwrap(),
    )
    .unwrap();
    let (_sub, events) = record(&tree, node);
    assert_eq!(tree.get(node, &color).unwrap(), Some(Value::Color(1)));

    tree.set_value(node, &style, second_style).unwrap();
    assert_eq!(tree.get(node, &color).unwrap(), Some(Value::Color(2)));

    tree.set_value(second_style, &color, Value::Color(3)).unwrap();
    assert_eq!(tree.get(node, &color).unwrap(), Some(Value::Color(3)));

    let events = events.lock();
    let colors: Vec<_> = events
        .iter()
        .filter_map(|event| event.get(&color))
        .map(|change| change.new.clone())
        .collect();
    assert_eq!(colors, vec![Some(Value::Color(2)), Some(Value::Color(3))]);
}

#[test]
fn test_weak_holder_subscription_is_swept() {
    setup();
    let group = widget_group();
    let padding = key(&group, "padding");

    let tree = HolderTree::new();
    let holder = tree.create(group);
    let seen = Arc::new(Mutex::new(0usize));
    let listener = {
        let seen = seen.clone();
        Arc::new(move |_: &HolderEvent| *seen.lock() += 1)
    };
    tree.subscribe_weak(holder, &listener).unwrap();
    assert!(tree.is_observed(holder));

    tree.set_value(holder, &padding, 6).unwrap();
    assert_eq!(*seen.lock(), 1);

    let sweeper = SweeperBuilder::new()
        .interval(Duration::from_secs(60))
        .build()
        .unwrap();
    sweeper.register(&tree.changes(holder).unwrap());

    drop(listener);
    assert_eq!(sweeper.sweep_now(), 1);
    assert!(!tree.is_observed(holder));
    assert!(!tree.changes(holder).unwrap().has_subscribers());
    assert!(sweeper.stop_and_join());
}

#[test]
fn test_destroyed_holder_is_invalid() {
    let group = widget_group();
    let padding = key(&group, "padding");
    let tree = HolderTree::new();
    let root = tree.create(group.clone());
    let child = tree.create_child(group, root).unwrap();

    tree.destroy(root).unwrap();
    assert!(tree.is_empty());
    assert!(tree.get(child, &padding).is_err());
    assert!(tree.destroy(root).is_err());
}

fn swatch_group() -> Arc<PropertyGroup> {
    PropertyGroup::builder("Swatch")
        .property("color", ValueType::Color)
        .property("accent", ValueType::Color)
        .property("peer", ValueType::Object)
        .property_with_default("padding", ValueType::Int, 2)
        .build()
        .unwrap()
}

fn colors(events: &Recorded, color: &PropertyKey) -> Vec<Option<Value>> {
    events
        .lock()
        .iter()
        .filter_map(|event| event.get(color))
        .map(|change| change.new.clone())
        .collect()
}

#[test]
fn test_fallback_to_parent_reference_reports_changes() {
    setup();
    let group = swatch_group();
    let color = group.lookup("color").unwrap();
    let accent = group.lookup("accent").unwrap();

    let tree = HolderTree::new();
    let window = tree.create(group.clone());
    let panel = tree.create_child(group.clone(), window).unwrap();
    let fallback = PropertyValue::reference(color, TargetAddress::Parent, accent).unwrap();
    tree.set(
        panel,
        color.key(),
        PropertyValue::reference_with_parent(color, TargetAddress::Parent, color, fallback).unwrap(),
    )
    .unwrap();
    let (_sub, events) = record(&tree, panel);

    tree.set_value(window, accent.key(), Value::Color(5)).unwrap();
    assert_eq!(tree.get(panel, color.key()).unwrap(), Some(Value::Color(5)));
    tree.set_value(window, color.key(), Value::Color(6)).unwrap();
    tree.unset(window, color.key()).unwrap();

    assert_eq!(
        colors(&events, color.key()),
        vec![Some(Value::Color(5)), Some(Value::Color(6)), Some(Value::Color(5))]
    );
}

#[test]
fn test_fallback_to_own_reference_reports_changes() {
    setup();
    let group = swatch_group();
    let color = group.lookup("color").unwrap();
    let accent = group.lookup("accent").unwrap();

    let tree = HolderTree::new();
    let window = tree.create(group.clone());
    let panel = tree.create_child(group.clone(), window).unwrap();
    let fallback = PropertyValue::reference(color, TargetAddress::This, accent).unwrap();
    tree.set(
        panel,
        color.key(),
        PropertyValue::reference_with_parent(color, TargetAddress::Parent, color, fallback).unwrap(),
    )
    .unwrap();
    let (_sub, events) = record(&tree, panel);

    tree.set_value(panel, accent.key(), Value::Color(9)).unwrap();
    assert_eq!(tree.get(panel, color.key()).unwrap(), Some(Value::Color(9)));

    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].get(accent.key()).unwrap().new, Some(Value::Color(9)));
    assert_eq!(events[0].get(color.key()).unwrap().old, None);
    assert_eq!(events[0].get(color.key()).unwrap().new, Some(Value::Color(9)));
}

#[test]
fn test_composite_address_follows_retargeted_object() {
    setup();
    let group = swatch_group();
    let color = group.lookup("color").unwrap();
    let peer = group.key("peer").unwrap();

    let tree = HolderTree::new();
    let holder = tree.create(group.clone());
    let middle = tree.create(group.clone());
    let first = tree.create(group.clone());
    let second = tree.create(group.clone());
    tree.set_value(first, color.key(), Value::Color(1)).unwrap();
    tree.set_value(second, color.key(), Value::Color(2)).unwrap();
    tree.set_value(holder, &peer, middle).unwrap();
    tree.set_value(middle, &peer, first).unwrap();

    let address = TargetAddress::Composite(vec![
        TargetAddress::PropertyObjectProperty(peer.clone()),
        TargetAddress::PropertyObjectProperty(peer.clone()),
    ]);
    tree.set(holder, color.key(), PropertyValue::reference(color, address, color).unwrap())
        .unwrap();
    let (_sub, events) = record(&tree, holder);
    assert_eq!(tree.get(holder, color.key()).unwrap(), Some(Value::Color(1)));

    tree.set_value(middle, &peer, second).unwrap();
    tree.set_value(second, color.key(), Value::Color(3)).unwrap();
    // The old target no longer drives the holder.
    tree.set_value(first, color.key(), Value::Color(4)).unwrap();

    assert_eq!(tree.get(holder, color.key()).unwrap(), Some(Value::Color(3)));
    assert_eq!(
        colors(&events, color.key()),
        vec![Some(Value::Color(2)), Some(Value::Color(3))]
    );
    assert!(!tree.is_observed(first));
}

#[test]
fn test_rejected_reference_leaves_holder_unchanged() {
    setup();
    let group = swatch_group();
    let padding = group.key("padding").unwrap();
    let color = group.lookup("color").unwrap();

    let tree = HolderTree::new();
    let parent = tree.create(group.clone());
    let holder = tree.create_child(group.clone(), parent).unwrap();
    tree.set_value(parent, color.key(), Value::Color(0xff)).unwrap();
    let (_sub, events) = record(&tree, holder);
    let before = tree.effective(holder, &padding).unwrap();

    let wrong = PropertyValue::reference(color, TargetAddress::Parent, color).unwrap();
    let err = tree.set(holder, &padding, wrong).unwrap_err();
    assert!(matches!(err, lattice_props::PropertyError::IncompatibleReferenceType { .. }));

    assert_eq!(tree.effective(holder, &padding).unwrap(), before);
    assert_eq!(tree.get(holder, &padding).unwrap(), Some(Value::Int(2)));
    assert_eq!(tree.get_local(holder, &padding).unwrap(), None);
    assert!(events.lock().is_empty());
}
