use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::Filter;
use crate::error::{Error, Result};
use crate::node::Node;

/// 从按延迟升序排列的节点中选出最终使用的节点
///
/// 没有过滤器时只取最快的一个；否则每个过滤器按顺序认领第一个
/// 名称匹配且未被认领的节点，并打上过滤器的标签。
pub fn select_best(nodes: &[Node], filters: &[Filter]) -> Result<Vec<Node>> {
    if filters.is_empty() {
        return nodes
            .first()
            .cloned()
            .map(|node| vec![node])
            .ok_or(Error::NoServerAvailable);
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut selected = Vec::new();

    for filter in filters {
        let re = match Regex::new(&filter.selector) {
            Ok(re) => re,
            Err(e) => {
                warn!("过滤器 '{}' 不是合法的正则表达式: {}", filter.tag, e);
                continue;
            }
        };

        let found = nodes
            .iter()
            .find(|n| re.is_match(&n.name) && !claimed.contains(n.name.as_str()));
        match found {
            Some(node) => {
                claimed.insert(node.name.as_str());
                let mut node = node.clone();
                node.tag = Some(filter.tag.clone());
                selected.push(node);
            }
            None => debug!("selected proxy no server available: '{}'", filter.tag),
        }
    }

    if selected.is_empty() {
        return Err(Error::NoServerAvailable);
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::parse_link;

    fn sorted(entries: &[(&str, i32)]) -> Vec<Node> {
        entries
            .iter()
            .enumerate()
            .map(|(i, (name, delay))| {
                let mut node = parse_link(&format!("trojan://pw@h{i}.example.com:443")).unwrap();
                node.name = name.to_string();
                node.delay = *delay;
                node
            })
            .collect()
    }

    fn filter(selector: &str, tag: &str) -> Filter {
        Filter {
            selector: selector.to_string(),
            tag: tag.to_string(),
        }
    }

    #[test]
    fn no_filters_returns_fastest() {
        let nodes = sorted(&[("香港 01", 80), ("日本 01", 90)]);
        let result = select_best(&nodes, &[]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].name, "香港 01");
        assert_eq!(result[0].tag, None);
    }

    #[test]
    fn empty_input_has_no_server() {
        assert!(matches!(select_best(&[], &[]), Err(Error::NoServerAvailable)));
        assert!(matches!(
            select_best(&[], &[filter("HK", "a")]),
            Err(Error::NoServerAvailable)
        ));
    }

    #[test]
    fn filters_claim_in_order() {
        let nodes = sorted(&[("HK 01", 50), ("JP 01", 60), ("HK 02", 70), ("US 01", 80)]);
        let result = select_best(&nodes, &[filter("JP", "jp"), filter("HK", "hk"), filter("US|HK", "any")]).unwrap();
        let picked: Vec<_> = result.iter().map(|n| (n.name.as_str(), n.tag.as_deref())).collect();
        assert_eq!(
            picked,
            [("JP 01", Some("jp")), ("HK 01", Some("hk")), ("HK 02", Some("any"))]
        );
    }

    #[test]
    fn second_filter_on_same_candidate_is_skipped() {
        let nodes = sorted(&[("HK 01", 50), ("JP 01", 60)]);
        let result = select_best(&nodes, &[filter("HK", "a"), filter("HK", "b")]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].tag.as_deref(), Some("a"));
    }

    #[test]
    fn only_filter_without_match_fails() {
        let nodes = sorted(&[("HK 01", 50)]);
        assert!(matches!(
            select_best(&nodes, &[filter("SG", "sg")]),
            Err(Error::NoServerAvailable)
        ));
    }

    #[test]
    fn invalid_regex_is_skipped() {
        let nodes = sorted(&[("HK 01", 50)]);
        let result = select_best(&nodes, &[filter("(", "bad"), filter("HK", "hk")]).unwrap();
        assert_eq!(result[0].tag.as_deref(), Some("hk"));
    }
}
