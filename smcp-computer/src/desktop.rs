//! Pure desktop-organizing policy: takes the raw `(server, window_uri,
//! detail)` triples the manager collected and decides what to render and in
//! what order. Has no knowledge of the manager or any live connection, so it
//! is trivial to unit test in isolation.

use std::collections::HashSet;

use smcp_mcp_client::ContentBlock;
use smcp_mcp_client::ReadResourceOutcome;
use smcp_window_uri::WindowUri;

/// One server's appearance in recent desktop-view history, most-recent last
/// is NOT assumed; callers pass entries in chronological order and this
/// module walks them in reverse to find recency.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub server: String,
}

/// `(server name, window URI string, resource detail)` as collected by the
/// manager from each connected server's `list_windows`/`get_window_detail`.
pub type RawWindow = (String, String, ReadResourceOutcome);

/// Builds the ordered list of rendered window strings a desktop view should
/// show. Each entry is `"{uri}\n{rendered text}"`, or just `"{uri}"` when
/// rendering the detail failed.
///
/// Ordering: servers are visited in most-recently-used-first order (per
/// `history`, reversed), with any server absent from history appended
/// afterward in name order. Within a server, windows sort by descending
/// [`WindowUri::ordering_priority`]. A `fullscreen=true` window, once
/// encountered, is the only window emitted for its server — processing moves
/// straight to the next server. `size`, if given, caps the total number of
/// emitted windows; once reached, iteration stops entirely (including across
/// servers not yet visited).
pub async fn organize_desktop(
    windows: Vec<RawWindow>,
    size: Option<usize>,
    history: &[HistoryEntry],
) -> Vec<String> {
    if size == Some(0) {
        return Vec::new();
    }

    let mut by_server: Vec<(String, Vec<(WindowUri, ReadResourceOutcome)>)> = Vec::new();
    for (server, uri_str, detail) in windows {
        let uri = match uri_str.parse::<WindowUri>() {
            Ok(u) => u,
            Err(_) => continue,
        };
        match by_server.iter_mut().find(|(s, _)| *s == server) {
            Some((_, entries)) => entries.push((uri, detail)),
            None => by_server.push((server, vec![(uri, detail)])),
        }
    }

    let order = server_order(by_server.iter().map(|(s, _)| s.as_str()), history);
    let mut by_name: std::collections::HashMap<String, Vec<(WindowUri, ReadResourceOutcome)>> =
        by_server.into_iter().collect();

    let mut out = Vec::new();
    for server in order {
        let Some(mut entries) = by_name.remove(&server) else { continue };
        entries.sort_by(|a, b| b.0.ordering_priority().cmp(&a.0.ordering_priority()));

        for (uri, detail) in entries {
            if detail.content.is_empty() {
                continue;
            }
            if let Some(cap) = size {
                if out.len() >= cap {
                    return out;
                }
            }
            out.push(render_window(&uri, &detail));
            if uri.fullscreen() {
                break;
            }
        }
    }
    out
}

/// Most-recently-used server first (later `history` entries win), then
/// remaining servers lexicographically.
fn server_order<'a>(servers: impl Iterator<Item = &'a str>, history: &[HistoryEntry]) -> Vec<String> {
    let all: HashSet<&str> = servers.collect();
    let mut ordered = Vec::new();
    let mut seen = HashSet::new();
    for entry in history.iter().rev() {
        if all.contains(entry.server.as_str()) && seen.insert(entry.server.clone()) {
            ordered.push(entry.server.clone());
        }
    }
    let mut remaining: Vec<&str> = all.into_iter().filter(|s| !seen.contains(*s)).collect();
    remaining.sort_unstable();
    ordered.extend(remaining.into_iter().map(String::from));
    ordered
}

fn render_window(uri: &WindowUri, detail: &ReadResourceOutcome) -> String {
    if detail.content.is_empty() {
        return uri.to_string();
    }
    let mut text = String::new();
    for block in &detail.content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::Blob { .. } => {
                tracing::debug!(uri = %uri, "skipping blob content in desktop render");
            }
        }
    }
    if text.is_empty() {
        uri.to_string()
    } else {
        format!("{uri}\n{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_detail(uri: &str, text: &str) -> ReadResourceOutcome {
        ReadResourceOutcome { uri: uri.to_string(), content: vec![ContentBlock::Text { text: text.to_string() }] }
    }

    #[tokio::test]
    async fn priority_within_server_and_size_cap() {
        let windows = vec![
            ("srv".to_string(), "window://srv/w1?priority=10".to_string(), text_detail("w1", "w1-text")),
            ("srv".to_string(), "window://srv/w2?priority=90".to_string(), text_detail("w2", "w2-text")),
            ("srv".to_string(), "window://srv/w3".to_string(), text_detail("w3", "w3-text")),
        ];
        let ret = organize_desktop(windows, Some(2), &[]).await;
        assert!(ret[0].starts_with("window://srv/w2?priority=90") && ret[0].contains("w2-text"));
        assert!(ret[1].starts_with("window://srv/w1?priority=10") && ret[1].contains("w1-text"));
        assert_eq!(ret.len(), 2);
    }

    #[tokio::test]
    async fn fullscreen_one_per_server_then_next_server() {
        let windows = vec![
            ("A".to_string(), "window://A/a1?priority=50".to_string(), text_detail("a1", "a1")),
            (
                "A".to_string(),
                "window://A/a2?fullscreen=true&priority=10".to_string(),
                text_detail("a2", "a2-full"),
            ),
            ("A".to_string(), "window://A/a3?priority=90".to_string(), text_detail("a3", "a3")),
            ("B".to_string(), "window://B/b1?priority=5".to_string(), text_detail("b1", "b1")),
        ];
        let history = [HistoryEntry { server: "A".to_string() }];
        let ret = organize_desktop(windows, None, &history).await;
        assert!(ret[0].starts_with("window://A/a2?fullscreen=true&priority=10") && ret[0].contains("a2-full"));
        assert!(ret.iter().any(|x| x.starts_with("window://B/b1?priority=5") && x.contains("b1")));
    }

    #[tokio::test]
    async fn server_order_by_recent_history() {
        let windows = vec![
            ("A".to_string(), "window://A/a1?priority=1".to_string(), text_detail("a", "a")),
            ("B".to_string(), "window://B/b1?priority=1".to_string(), text_detail("b", "b")),
            ("C".to_string(), "window://C/c1?priority=1".to_string(), text_detail("c", "c")),
        ];
        let history = [HistoryEntry { server: "A".to_string() }, HistoryEntry { server: "C".to_string() }];
        let ret = organize_desktop(windows, None, &history).await;
        assert!(ret[0].starts_with("window://C/c1?priority=1"));
        assert!(ret[1].starts_with("window://A/a1?priority=1"));
        assert!(ret[2].starts_with("window://B/b1?priority=1"));
    }

    #[tokio::test]
    async fn size_zero_returns_empty() {
        assert_eq!(organize_desktop(vec![], Some(0), &[]).await, Vec::<String>::new());
    }

    #[tokio::test]
    async fn skip_empty_contents() {
        let windows = vec![
            (
                "S".to_string(),
                "window://S/empty".to_string(),
                ReadResourceOutcome { uri: "window://S/empty".to_string(), content: vec![] },
            ),
            ("S".to_string(), "window://S/ok".to_string(), text_detail("ok", "ok")),
        ];
        let ret = organize_desktop(windows, None, &[]).await;
        assert_eq!(ret.len(), 1);
        assert!(ret[0].starts_with("window://S/ok") && ret[0].contains("ok"));
    }

    #[tokio::test]
    async fn invalid_window_uri_is_skipped() {
        let windows = vec![
            (
                "G".to_string(),
                ":::this_is_not_a_uri".to_string(),
                text_detail("bad", "bad"),
            ),
            ("G".to_string(), "window://G/good".to_string(), text_detail("good", "good")),
        ];
        let ret = organize_desktop(windows, None, &[]).await;
        assert_eq!(ret.len(), 1);
        assert!(ret[0].starts_with("window://G/good") && ret[0].contains("good"));
    }

    #[tokio::test]
    async fn server_level_cap_breaks_iteration() {
        let windows = vec![
            ("A".to_string(), "window://A/a".to_string(), text_detail("a", "a")),
            ("B".to_string(), "window://B/b".to_string(), text_detail("b", "b")),
        ];
        let history = [HistoryEntry { server: "A".to_string() }];
        let ret = organize_desktop(windows, Some(1), &history).await;
        assert_eq!(ret.len(), 1);
        assert!(ret[0].starts_with("window://A/a"));
    }
}
