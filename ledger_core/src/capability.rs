//! Capability grants and the diff between two resolutions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A named, parameterized permission grant declared for a package.
///
/// Params live in a `BTreeMap`, so equality ignores insertion order and
/// serialization emits keys sorted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Capability {
    /// Create a capability with no params.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add or replace a param.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.params.is_empty() {
            let params: Vec<String> = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={:?}", k, v))
                .collect();
            write!(f, " {{{}}}", params.join(", "))?;
        }
        Ok(())
    }
}

/// Structural equality: same name and the same set of `(key, value)` params.
pub fn capabilities_equal(a: &Capability, b: &Capability) -> bool {
    a == b
}

/// Kind of a [`CapabilityChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeType::Added => "added",
            ChangeType::Removed => "removed",
            ChangeType::Modified => "modified",
        })
    }
}

/// One difference in a package's capabilities between two resolutions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change_type", rename_all = "lowercase")]
pub enum CapabilityChange {
    /// A capability name granted only by the new resolution.
    Added {
        #[serde(rename = "package_name")]
        package: String,
        capability: Capability,
    },
    /// A capability name granted only by the previous resolution.
    Removed {
        #[serde(rename = "package_name")]
        package: String,
        capability: Capability,
    },
    /// Same capability name, different params.
    Modified {
        #[serde(rename = "package_name")]
        package: String,
        old: Capability,
        new: Capability,
    },
}

impl CapabilityChange {
    pub fn package_name(&self) -> &str {
        match self {
            CapabilityChange::Added { package, .. }
            | CapabilityChange::Removed { package, .. }
            | CapabilityChange::Modified { package, .. } => package,
        }
    }

    pub fn change_type(&self) -> ChangeType {
        match self {
            CapabilityChange::Added { .. } => ChangeType::Added,
            CapabilityChange::Removed { .. } => ChangeType::Removed,
            CapabilityChange::Modified { .. } => ChangeType::Modified,
        }
    }

    pub fn old_capability(&self) -> Option<&Capability> {
        match self {
            CapabilityChange::Removed { capability, .. } => Some(capability),
            CapabilityChange::Modified { old, .. } => Some(old),
            CapabilityChange::Added { .. } => None,
        }
    }

    pub fn new_capability(&self) -> Option<&Capability> {
        match self {
            CapabilityChange::Added { capability, .. } => Some(capability),
            CapabilityChange::Modified { new, .. } => Some(new),
            CapabilityChange::Removed { .. } => None,
        }
    }
}

impl fmt::Display for CapabilityChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityChange::Added {
                package,
                capability,
            } => write!(f, "{}: + {}", package, capability),
            CapabilityChange::Removed {
                package,
                capability,
            } => write!(f, "{}: - {}", package, capability),
            CapabilityChange::Modified { package, old, new } => {
                write!(f, "{}: ~ {} -> {}", package, old, new)
            }
        }
    }
}

/// Compare a package's previous and new capabilities.
///
/// Capabilities are grouped by name. Within a name, grants present on only one
/// side are paired off in sorted order as `Modified`; whatever is left over is
/// `Added` or `Removed`. Identical sets produce nothing, regardless of order.
pub fn diff_capabilities(
    package: &str,
    old: &[Capability],
    new: &[Capability],
) -> Vec<CapabilityChange> {
    let mut by_name: BTreeMap<&str, (BTreeSet<&Capability>, BTreeSet<&Capability>)> =
        BTreeMap::new();
    for cap in old {
        by_name.entry(cap.name.as_str()).or_default().0.insert(cap);
    }
    for cap in new {
        by_name.entry(cap.name.as_str()).or_default().1.insert(cap);
    }

    let mut changes = Vec::new();
    for (old_set, new_set) in by_name.values() {
        let removed: Vec<&Capability> = old_set.difference(new_set).copied().collect();
        let added: Vec<&Capability> = new_set.difference(old_set).copied().collect();
        let paired = removed.len().min(added.len());

        for (old, new) in removed.iter().zip(added.iter()) {
            changes.push(CapabilityChange::Modified {
                package: package.to_string(),
                old: (*old).clone(),
                new: (*new).clone(),
            });
        }
        changes.extend(removed[paired..].iter().map(|c| CapabilityChange::Removed {
            package: package.to_string(),
            capability: (*c).clone(),
        }));
        changes.extend(added[paired..].iter().map(|c| CapabilityChange::Added {
            package: package.to_string(),
            capability: (*c).clone(),
        }));
    }

    changes
}

/// Human-readable report of capability changes, one line per change.
pub fn render_report(changes: &[CapabilityChange]) -> String {
    if changes.is_empty() {
        return "No capability changes.\n".to_string();
    }

    let mut out = format!(
        "{} capability change(s) require approval:\n",
        changes.len()
    );
    for change in changes {
        out.push_str("  ");
        out.push_str(&change.to_string());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs(path: &str) -> Capability {
        Capability::new("fs").with_param("path", path)
    }

    #[test]
    fn test_equal_ignores_param_order() {
        let a = Capability::new("net")
            .with_param("host", "example.com")
            .with_param("port", "443");
        let b = Capability::new("net")
            .with_param("port", "443")
            .with_param("host", "example.com");
        assert!(capabilities_equal(&a, &b));
    }

    #[test]
    fn test_equal_sensitive_to_values_and_keys() {
        assert!(!capabilities_equal(&fs("./a"), &fs("./b")));
        assert!(!capabilities_equal(
            &fs("./a"),
            &Capability::new("fs").with_param("dir", "./a")
        ));
        assert!(!capabilities_equal(
            &fs("./a"),
            &fs("./a").with_param("mode", "ro")
        ));
        assert!(!capabilities_equal(&Capability::new("fs"), &Capability::new("net")));
    }

    #[test]
    fn test_display() {
        assert_eq!(fs("./data").to_string(), r#"fs {path="./data"}"#);
        assert_eq!(Capability::new("clock").to_string(), "clock");
    }

    #[test]
    fn test_diff_identical_is_empty() {
        let caps = vec![fs("./data"), Capability::new("net")];
        let reordered = vec![Capability::new("net"), fs("./data")];
        assert!(diff_capabilities("pkg", &caps, &reordered).is_empty());
    }

    #[test]
    fn test_diff_modified() {
        let changes = diff_capabilities("crypto", &[fs("./data")], &[fs("./different-data")]);
        assert_eq!(
            changes,
            vec![CapabilityChange::Modified {
                package: "crypto".into(),
                old: fs("./data"),
                new: fs("./different-data"),
            }]
        );
        assert_eq!(changes[0].change_type(), ChangeType::Modified);
        assert_eq!(changes[0].old_capability(), Some(&fs("./data")));
        assert_eq!(changes[0].new_capability(), Some(&fs("./different-data")));
    }

    #[test]
    fn test_diff_added_and_removed() {
        let old = vec![Capability::new("clock")];
        let new = vec![Capability::new("net").with_param("host", "x")];
        let changes = diff_capabilities("pkg", &old, &new);

        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].change_type(), ChangeType::Removed);
        assert_eq!(changes[0].old_capability().unwrap().name, "clock");
        assert_eq!(changes[1].change_type(), ChangeType::Added);
        assert_eq!(changes[1].new_capability().unwrap().name, "net");
        assert!(changes.iter().all(|c| c.package_name() == "pkg"));
    }

    #[test]
    fn test_diff_extra_grant_of_same_name_is_added() {
        let changes = diff_capabilities("pkg", &[fs("./a")], &[fs("./a"), fs("./b")]);
        assert_eq!(
            changes,
            vec![CapabilityChange::Added {
                package: "pkg".into(),
                capability: fs("./b"),
            }]
        );
    }

    #[test]
    fn test_report() {
        let changes = diff_capabilities("crypto", &[fs("./data")], &[fs("./other")]);
        let report = render_report(&changes);
        assert!(report.contains("1 capability change(s)"));
        assert!(report.contains(r#"crypto: ~ fs {path="./data"} -> fs {path="./other"}"#));
        assert_eq!(render_report(&[]), "No capability changes.\n");
    }

    #[test]
    fn test_change_json_shape() {
        let change = CapabilityChange::Added {
            package: "p".into(),
            capability: Capability::new("net"),
        };
        let value = serde_json::to_value(&change).unwrap();
        assert_eq!(value["change_type"], "added");
        assert_eq!(value["package_name"], "p");
        assert!(value.get("package").is_none());

        let modified = CapabilityChange::Modified {
            package: "q".into(),
            old: Capability::new("fs").with_param("path", "./a"),
            new: Capability::new("fs").with_param("path", "./b"),
        };
        let value = serde_json::to_value(&modified).unwrap();
        assert_eq!(value["change_type"], "modified");
        assert_eq!(value["package_name"], "q");
    }

    use proptest::prelude::*;

    proptest! {
        /// Param insertion order never affects equality or the diff
        #[test]
        fn prop_param_order_irrelevant(
            params in prop::collection::btree_map("[a-z]{1,6}", "[a-z0-9./]{0,8}", 0..6)
        ) {
            let forward = params
                .iter()
                .fold(Capability::new("cap"), |c, (k, v)| c.with_param(k.clone(), v.clone()));
            let backward = params
                .iter()
                .rev()
                .fold(Capability::new("cap"), |c, (k, v)| c.with_param(k.clone(), v.clone()));
            prop_assert!(capabilities_equal(&forward, &backward));
            prop_assert!(diff_capabilities("p", &[forward], &[backward]).is_empty());
        }

        /// Changing any single value is detected
        #[test]
        fn prop_value_change_detected(
            params in prop::collection::btree_map("[a-z]{1,6}", "[a-z]{1,8}", 1..6),
            idx in any::<prop::sample::Index>(),
        ) {
            let original = Capability { name: "cap".into(), params: params.clone() };
            let mut changed = original.clone();
            let key = idx.get(&params.keys().cloned().collect::<Vec<_>>()).clone();
            changed.params.insert(key, "CHANGED".into());
            prop_assert!(!capabilities_equal(&original, &changed));
            prop_assert_eq!(diff_capabilities("p", &[original], &[changed]).len(), 1);
        }
    }
}
