//! Injective shortening of tool names to the upstream's 64-char limit,
//! with the inverse map for rewriting upstream calls back.

use std::collections::HashMap;

pub const MAX_TOOL_NAME_LEN: usize = 64;

const MCP_PREFIX: &str = "mcp__";

/// Bijection between caller-provided tool names and the (possibly
/// shortened) names sent upstream.
#[derive(Debug, Default, Clone)]
pub struct ToolNameMap {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl ToolNameMap {
    pub fn build<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = Self::default();
        for name in names {
            map.insert(name.as_ref());
        }
        map
    }

    fn insert(&mut self, name: &str) {
        if self.forward.contains_key(name) {
            return;
        }
        let candidate = shorten_candidate(name);
        let assigned = self.disambiguate(candidate);
        self.forward.insert(name.to_string(), assigned.clone());
        self.reverse.insert(assigned, name.to_string());
    }

    /// Break collisions with a `~i` suffix, trimming the stem so the
    /// total stays within the limit.
    fn disambiguate(&self, candidate: String) -> String {
        if !self.reverse.contains_key(&candidate) {
            return candidate;
        }
        for i in 1.. {
            let suffix = format!("~{i}");
            let keep = MAX_TOOL_NAME_LEN.saturating_sub(suffix.len());
            let stem: String = candidate.chars().take(keep).collect();
            let attempt = format!("{stem}{suffix}");
            if !self.reverse.contains_key(&attempt) {
                return attempt;
            }
        }
        unreachable!("collision suffixes are unbounded")
    }

    /// Upstream-safe name for a caller-provided one.
    pub fn shorten(&self, name: &str) -> String {
        self.forward
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Original name for an upstream one; unknown names pass through.
    pub fn restore(&self, name: &str) -> String {
        self.reverse
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

fn shorten_candidate(name: &str) -> String {
    if name.chars().count() <= MAX_TOOL_NAME_LEN {
        return name.to_string();
    }
    if let Some(rest) = name.strip_prefix(MCP_PREFIX) {
        // Keep the mcp marker and the final segment, which carries the
        // tool's own name.
        let tail = rest.rsplit("__").next().unwrap_or(rest);
        let candidate = format!("{MCP_PREFIX}{tail}");
        return candidate.chars().take(MAX_TOOL_NAME_LEN).collect();
    }
    name.chars().take(MAX_TOOL_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_names_pass_through() {
        let map = ToolNameMap::build(["lookup", "write_file"]);
        assert_eq!(map.shorten("lookup"), "lookup");
        assert_eq!(map.restore("write_file"), "write_file");
    }

    #[test]
    fn mcp_names_keep_prefix_and_last_segment() {
        let long = "mcp__github__search_issues_with_very_long_tail_exceeding_sixty_four_chars";
        let map = ToolNameMap::build([long]);
        let short = map.shorten(long);
        assert!(short.len() <= MAX_TOOL_NAME_LEN);
        assert!(short.starts_with("mcp__search_issues_with_very_long_tail_exceeding_sixty_four_cha"));
        assert_eq!(map.restore(&short), long);
    }

    #[test]
    fn plain_long_names_truncate() {
        let long = "a".repeat(90);
        let map = ToolNameMap::build([long.as_str()]);
        assert_eq!(map.shorten(&long), "a".repeat(64));
    }

    #[test]
    fn collisions_get_tilde_suffixes() {
        let a = format!("{}{}", "x".repeat(70), "1");
        let b = format!("{}{}", "x".repeat(70), "2");
        let c = format!("{}{}", "x".repeat(70), "3");
        let map = ToolNameMap::build([a.as_str(), b.as_str(), c.as_str()]);

        let shorts: Vec<String> = [&a, &b, &c].iter().map(|n| map.shorten(n)).collect();
        assert_eq!(shorts[0], "x".repeat(64));
        assert_eq!(shorts[1], format!("{}~1", "x".repeat(62)));
        assert_eq!(shorts[2], format!("{}~2", "x".repeat(62)));
        for (short, original) in shorts.iter().zip([&a, &b, &c]) {
            assert!(short.len() <= MAX_TOOL_NAME_LEN);
            assert_eq!(map.restore(short), *original);
        }
    }

    #[test]
    fn map_is_injective_over_mixed_sets() {
        let names = [
            "short".to_string(),
            "mcp__srv__tool".to_string(),
            format!("mcp__alpha__{}", "t".repeat(80)),
            format!("mcp__beta__{}", "t".repeat(80)),
            "y".repeat(65),
            "y".repeat(66),
        ];
        let map = ToolNameMap::build(names.iter().map(String::as_str));
        let mut seen = std::collections::HashSet::new();
        for name in &names {
            let short = map.shorten(name);
            assert!(short.len() <= MAX_TOOL_NAME_LEN);
            assert!(seen.insert(short.clone()), "duplicate short name {short}");
            assert_eq!(&map.restore(&short), name);
        }
    }
}
