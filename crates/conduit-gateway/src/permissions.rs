//! Dot/colon-separated wildcard permission matching (spec §4.10).

pub fn matches(pattern: &str, candidate: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    let pattern_segments: Vec<&str> = split_segments(pattern);
    let candidate_segments: Vec<&str> = split_segments(candidate);

    if let Some((last, prefix)) = pattern_segments.split_last() {
        if *last == "*" {
            if candidate_segments.len() < prefix.len() {
                return false;
            }
            return prefix.iter().zip(candidate_segments.iter()).all(|(a, b)| a == b);
        }
    }
    pattern_segments == candidate_segments
}

pub fn any_matches(patterns: &[String], candidate: &str) -> bool {
    patterns.iter().any(|p| matches(p, candidate))
}

fn split_segments(s: &str) -> Vec<&str> {
    s.split(|c| c == '.' || c == ':').collect()
}

/// `mcp:<method with "/" -> ":">:<connector?>`.
pub fn mcp_permission(method: &str, connector: Option<&str>) -> String {
    let method = method.replace('/', ":");
    match connector {
        Some(c) => format!("mcp:{method}:{c}"),
        None => format!("mcp:{method}"),
    }
}

/// `a2a:<op>:<agent?>`.
pub fn a2a_permission(op: &str, agent: Option<&str>) -> String {
    let op = op.replace('/', ":");
    match agent {
        Some(a) => format!("a2a:{op}:{a}"),
        None => format!("a2a:{op}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_star_matches_everything() {
        assert!(matches("*", "mcp:call:anything"));
    }

    #[test]
    fn trailing_wildcard_matches_any_suffix_depth() {
        assert!(matches("mcp:*", "mcp:call:X"));
        assert!(matches("mcp:call:*", "mcp:call:Y"));
    }

    #[test]
    fn trailing_wildcard_does_not_match_a_different_prefix() {
        assert!(!matches("mcp:call:*", "mcp:resources:list"));
    }

    #[test]
    fn exact_match_without_wildcard() {
        assert!(matches("mcp:call:fs", "mcp:call:fs"));
        assert!(!matches("mcp:call:fs", "mcp:call:fs:extra"));
    }

    #[test]
    fn partial_segment_prefixes_do_not_match() {
        assert!(!matches("mcp:ca*", "mcp:call:X"));
    }

    #[test]
    fn build_rules_match_spec_shape() {
        assert_eq!(mcp_permission("tools/call", Some("fs")), "mcp:tools:call:fs");
        assert_eq!(a2a_permission("message/send", Some("weather")), "a2a:message:send:weather");
    }
}
