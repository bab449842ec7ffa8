//! Logging and debugging facilities for lattice-props.
//!
//! # Tracing Integration
//!
//! lattice-props is instrumented with the `tracing` crate. Nothing is
//! printed unless the application installs a subscriber:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("lattice_props::holder=trace")
//!     .init();
//! ```
//!
//! # Debug Visualization
//!
//! [`HolderTreeDebug`] renders holders with their resolved values:
//!
//! ```
//! use lattice_props::logging::{HolderTreeDebug, TreeFormatOptions};
//! use lattice_props::{HolderTree, PropertyGroup, ValueType};
//!
//! let group = PropertyGroup::builder("Button")
//!     .property_with_default("label", ValueType::Text, "OK")
//!     .build()
//!     .unwrap();
//! let tree = HolderTree::new();
//! let root = tree.create(group.clone());
//! tree.create_child(group, root).unwrap();
//!
//! let debug = HolderTreeDebug::with_options(TreeFormatOptions::minimal());
//! let output = debug.format_subtree(&tree, root).unwrap();
//! assert_eq!(output.lines().count(), 2);
//! ```

use std::fmt::Write as FmtWrite;

use crate::error::PropertyError;
use crate::holder::{HolderId, HolderTree};
use crate::reference::PropertyValue;

/// Target names for log filtering.
pub mod targets {
    /// Crate root target.
    pub const CORE: &str = "lattice_props";
    /// Signal bus target.
    pub const SIGNAL: &str = "lattice_props::signal";
    /// Layer and stack target.
    pub const STACK: &str = "lattice_props::stack";
    /// Holder tree and reference target.
    pub const HOLDER: &str = "lattice_props::holder";
    /// Binary encoding target.
    pub const CODEC: &str = "lattice_props::codec";
    /// Background sweeper target.
    pub const SWEEPER: &str = "lattice_props::sweeper";
}

/// Style options for holder tree visualization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Compact single-line representation.
    Compact,
}

/// Configuration for holder tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    pub style: TreeStyle,
    /// Whether to show holder IDs.
    pub show_ids: bool,
    /// Whether to list each holder's resolved values.
    pub show_values: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_ids: true,
            show_values: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_values: true,
            ..Default::default()
        }
    }

    /// Options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_ids: false,
            show_values: false,
            ..Default::default()
        }
    }
}

/// Renders holder trees for debugging.
#[derive(Debug, Clone, Default)]
pub struct HolderTreeDebug {
    options: TreeFormatOptions,
}

impl HolderTreeDebug {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TreeFormatOptions) -> Self {
        Self { options }
    }

    /// Format every root holder and its subtree.
    pub fn format_all(&self, tree: &HolderTree) -> Result<String, PropertyError> {
        let roots = tree.roots();

        let mut output = String::new();
        writeln!(output, "Holder Tree ({} total holders):", tree.len()).expect("write to String");
        if roots.is_empty() {
            writeln!(output, "  (empty)").expect("write to String");
        }
        for root in roots {
            self.format_into(tree, root, 0, true, &mut output)?;
        }
        Ok(output)
    }

    /// Format the subtree rooted at `root`.
    pub fn format_subtree(&self, tree: &HolderTree, root: HolderId) -> Result<String, PropertyError> {
        let mut output = String::new();
        self.format_into(tree, root, 0, true, &mut output)?;
        Ok(output)
    }

    fn format_into(
        &self,
        tree: &HolderTree,
        id: HolderId,
        depth: usize,
        is_last: bool,
        output: &mut String,
    ) -> Result<(), PropertyError> {
        if self.options.max_depth.is_some_and(|max| depth > max) {
            return Ok(());
        }

        let group = tree.group(id)?;
        output.push_str(&self.build_prefix(depth, is_last));
        output.push_str(group.name());
        if self.options.show_ids {
            write!(output, " [{:?}]", id).expect("write to String");
        }
        output.push('\n');

        if self.options.show_values {
            let stack = tree.stack(id)?;
            let prefix = self.build_value_prefix(depth);
            for key in stack.keys() {
                let shown = match (stack.effective(&key), tree.get(id, &key)?) {
                    (Some(PropertyValue::Reference(_)), Some(value)) => format!("{value:?} (ref)"),
                    (Some(PropertyValue::Reference(_)), None) => "(unresolved ref)".to_string(),
                    (_, Some(value)) => format!("{value:?}"),
                    (_, None) => continue,
                };
                writeln!(output, "{}  .{} = {}", prefix, key.name(), shown).expect("write to String");
            }
        }

        let children = tree.children(id)?;
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            self.format_into(tree, child, depth + 1, i + 1 == count, output)?;
        }
        Ok(())
    }

    fn build_prefix(&self, depth: usize, is_last: bool) -> String {
        if depth == 0 {
            return String::new();
        }

        let (branch, tee, corner) = match self.options.style {
            TreeStyle::Ascii => ("|", "+-- ", "`-- "),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}\u{2500}\u{2500} ", "\u{2514}\u{2500}\u{2500} "),
            TreeStyle::Compact => ("", "- ", "- "),
        };

        let mut prefix = String::new();
        for _ in 0..(depth - 1) {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix
    }

    fn build_value_prefix(&self, depth: usize) -> String {
        let branch = match self.options.style {
            TreeStyle::Ascii => "|",
            TreeStyle::Unicode => "\u{2502}",
            TreeStyle::Compact => "",
        };
        let mut prefix = String::new();
        for _ in 0..depth {
            prefix.push_str(branch);
            prefix.extend(std::iter::repeat_n(' ', self.options.indent_size));
        }
        prefix
    }
}
