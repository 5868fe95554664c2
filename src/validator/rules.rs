//! The standard rule set.
//!
//! Paths follow the network-OS layout, e.g. `interfaces [type] <name> address`,
//! `firewall [name <set>] rule <id> ...`, `nat source rule <id> ...`,
//! `protocols static route <cidr> next-hop`.

use std::collections::{BTreeMap, BTreeSet};

use super::formats;
use super::{ConfigValidationError, Rule};
use crate::tree::{ConfigNode, ConfigPath, ConfigTree};

/// Interface type containers; their children are interface names.
const INTERFACE_TYPES: &[&str] = &[
    "bonding", "bridge", "dummy", "ethernet", "geneve", "input", "l2tpv3", "loopback",
    "macsec", "openvpn", "pppoe", "tunnel", "virtual-ethernet", "vti", "vxlan",
    "wireguard", "wireless",
];

/// Leaf names whose value names an interface.
const INTERFACE_REFS: &[&str] = &[
    "inbound-interface",
    "outbound-interface",
    "listen-interface",
    "interface",
];

const FIREWALL_ACTIONS: &[&str] = &["accept", "drop", "reject", "return", "jump"];
const PROTOCOLS: &[&str] = &[
    "all", "tcp", "udp", "tcp_udp", "icmp", "icmpv6", "gre", "esp", "ah",
];
const PORT_PROTOCOLS: &[&str] = &["tcp", "udp", "tcp_udp"];

fn section(path: &ConfigPath) -> &str {
    path.segments().first().map(String::as_str).unwrap_or("")
}

fn parent_key(path: &ConfigPath) -> Option<&str> {
    let segments = path.segments();
    segments.len().checked_sub(2).map(|i| segments[i].as_str())
}

/// `firewall ... rule <id>` or `nat ... rule <id>`.
fn is_rule_node(path: &ConfigPath, in_section: &str) -> bool {
    path.len() >= 3 && section(path) == in_section && parent_key(path) == Some("rule")
}

fn child_value<'a>(node: &'a ConfigNode, key: &str) -> Option<&'a str> {
    node.children.get(key).and_then(|c| c.value.as_deref())
}

/// Interface name → path of its node, including `vif` sub-interfaces as
/// `<name>.<vlan>`.
pub fn interfaces(tree: &ConfigTree) -> BTreeMap<String, ConfigPath> {
    let mut found = BTreeMap::new();
    let root = ConfigPath::root().child("interfaces");
    let Some(section) = tree.get(&root) else {
        return found;
    };

    let mut add = |name: &str, path: ConfigPath, node: &ConfigNode| {
        if let Some(vifs) = node.children.get("vif") {
            for vlan in vifs.children.keys() {
                found.insert(
                    format!("{}.{}", name, vlan),
                    path.child("vif").child(vlan.clone()),
                );
            }
        }
        found.insert(name.to_string(), path);
    };

    for (name, node) in &section.children {
        let path = root.child(name.clone());
        if INTERFACE_TYPES.contains(&name.as_str()) {
            for (iface, iface_node) in &node.children {
                add(iface, path.child(iface.clone()), iface_node);
            }
        } else {
            add(name, path, node);
        }
    }
    found
}

/// Rejects nodes holding both a value and children.
pub struct StructureRule;

impl Rule for StructureRule {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn check(&self, tree: &ConfigTree, findings: &mut Vec<ConfigValidationError>) {
        for path in tree.structural_violations() {
            findings.push(ConfigValidationError::error(
                path,
                "node holds both a value and children",
            ));
        }
    }
}

/// Fields a node cannot work without.
pub struct RequiredFieldsRule;

impl Rule for RequiredFieldsRule {
    fn name(&self) -> &'static str {
        "required"
    }

    fn check(&self, tree: &ConfigTree, findings: &mut Vec<ConfigValidationError>) {
        tree.walk(|path, node| {
            let segments = path.segments();

            if segments.len() == 4
                && segments[0] == "protocols"
                && segments[1] == "static"
                && (segments[2] == "route" || segments[2] == "route6")
                && !["next-hop", "interface", "blackhole"]
                    .iter()
                    .any(|k| node.children.contains_key(*k))
            {
                findings.push(ConfigValidationError::error(
                    path.clone(),
                    "static route requires next-hop, interface or blackhole",
                ));
            }

            if is_rule_node(path, "nat")
                && segments.len() == 4
                && !node.children.contains_key("translation")
            {
                findings.push(ConfigValidationError::error(
                    path.clone(),
                    "NAT rule requires a translation",
                ));
            }

            if is_rule_node(path, "firewall") && !node.children.contains_key("action") {
                findings.push(ConfigValidationError::warning(
                    path.clone(),
                    "firewall rule has no action",
                ));
            }
        });
    }
}

/// Per-leaf value formats, plus rule id and route prefix keys.
pub struct FormatRule;

impl FormatRule {
    fn check_leaf(path: &ConfigPath, value: &str) -> Option<Result<(), String>> {
        let key = path.leaf()?;
        let in_section = section(path);
        let result = match key {
            "address" if in_section == "interfaces" => {
                if value == "dhcp" || value == "dhcpv6" {
                    Ok(())
                } else {
                    formats::cidr(value)
                }
            }
            "address" if in_section == "nat" && value == "masquerade" => Ok(()),
            "mac" | "hw-id" | "mac-address" => formats::mac_address(value),
            "address" | "listen-address" | "source-address" | "destination-address" => {
                formats::ip_or_cidr(value.trim_start_matches('!'))
            }
            "next-hop" | "gateway" | "default-gateway" | "name-server" => formats::ip_address(value),
            "port" | "destination-port" | "source-port" | "listen-port" => {
                formats::port_spec(value.trim_start_matches('!'))
            }
            "host-name" => formats::hostname(value),
            "domain-name" => formats::domain_name(value),
            "mtu" => formats::integer_in(value, 68, 16000),
            "action" if in_section == "firewall" => formats::one_of(value, FIREWALL_ACTIONS),
            "protocol" if in_section == "firewall" || in_section == "nat" => {
                formats::one_of(value.trim_start_matches('!'), PROTOCOLS)
            }
            _ => return None,
        };
        Some(result)
    }
}

impl Rule for FormatRule {
    fn name(&self) -> &'static str {
        "format"
    }

    fn check(&self, tree: &ConfigTree, findings: &mut Vec<ConfigValidationError>) {
        tree.walk(|path, node| {
            if is_rule_node(path, "firewall") || is_rule_node(path, "nat") {
                if let Some(id) = path.leaf() {
                    if let Err(message) = formats::integer_in(id, 1, 999_999) {
                        findings.push(ConfigValidationError::error(
                            path.clone(),
                            format!("rule id {}", message),
                        ));
                    }
                }
            }

            let segments = path.segments();
            if segments.len() == 4
                && segments[0] == "protocols"
                && segments[1] == "static"
                && (segments[2] == "route" || segments[2] == "route6")
            {
                if let Err(message) = formats::cidr(&segments[3]) {
                    findings.push(ConfigValidationError::error(path.clone(), message));
                }
            }

            if !node.is_leaf() {
                return;
            }
            match node.value.as_deref() {
                Some(value) => {
                    if let Some(Err(message)) = Self::check_leaf(path, value) {
                        findings.push(ConfigValidationError::error(path.clone(), message));
                    }
                }
                None => {
                    // Probe with an empty value to learn whether the key is typed.
                    if Self::check_leaf(path, "").is_some() {
                        findings.push(ConfigValidationError::error(
                            path.clone(),
                            format!("'{}' requires a value", path.leaf().unwrap_or_default()),
                        ));
                    }
                }
            }
        });
    }
}

/// Cross-section references.
pub struct ReferenceRule;

impl Rule for ReferenceRule {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn check(&self, tree: &ConfigTree, findings: &mut Vec<ConfigValidationError>) {
        let known = interfaces(tree);
        let exists = |name: &str| match name.strip_suffix('*') {
            Some(prefix) => known.keys().any(|k| k.starts_with(prefix)),
            None => known.contains_key(name),
        };

        tree.walk(|path, node| {
            if section(path) != "interfaces" && node.is_leaf() {
                let key = path.leaf().unwrap_or_default();
                let is_ref = INTERFACE_REFS.contains(&key)
                    || (key == "name"
                        && parent_key(path).is_some_and(|p| INTERFACE_REFS.contains(&p)));
                if is_ref {
                    if let Some(name) = node.value.as_deref() {
                        let name = name.trim_start_matches('!');
                        if !exists(name) {
                            findings.push(ConfigValidationError::error(
                                path.clone(),
                                format!("references unknown interface '{}'", name),
                            ));
                        }
                    }
                }
            }

            if is_rule_node(path, "firewall") || is_rule_node(path, "nat") {
                let matches_port = ["destination-port", "source-port"]
                    .iter()
                    .any(|k| node.children.contains_key(*k))
                    || ["destination", "source"].iter().any(|k| {
                        node.children
                            .get(*k)
                            .is_some_and(|side| side.children.contains_key("port"))
                    });
                let protocol = child_value(node, "protocol");
                if matches_port && !protocol.is_some_and(|p| PORT_PROTOCOLS.contains(&p)) {
                    findings.push(ConfigValidationError::warning(
                        path.clone(),
                        "port match without protocol tcp or udp",
                    ));
                }
            }
        });
    }
}

/// Values that must be unique across the tree.
pub struct ConflictRule;

impl Rule for ConflictRule {
    fn name(&self) -> &'static str {
        "conflict"
    }

    fn check(&self, tree: &ConfigTree, findings: &mut Vec<ConfigValidationError>) {
        let mut seen: BTreeMap<&str, String> = BTreeMap::new();
        let mut reported = BTreeSet::new();
        let interfaces = interfaces(tree);

        for (name, path) in &interfaces {
            let Some(node) = tree.get(path) else { continue };
            let Some(address) = child_value(node, "address") else {
                continue;
            };
            if address.starts_with("dhcp") {
                continue;
            }
            match seen.get(address) {
                Some(owner) if reported.insert(path.clone()) => {
                    findings.push(ConfigValidationError::error(
                        path.child("address"),
                        format!("address {} already assigned to {}", address, owner),
                    ));
                }
                Some(_) => {}
                None => {
                    seen.insert(address, name.clone());
                }
            }
        }
    }
}
