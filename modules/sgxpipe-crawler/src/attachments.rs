use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;
use url::Url;

/// Marker phrase the detail pages use when the first attachment is a
/// browser-compatibility duplicate of the second.
const FALLBACK_LINK_PHRASE: &str =
    "if you are unable to view the above file, please click the link below";

fn attachment_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<dl[^>]*class="[^"]*announcement-attachment-list[^"]*"[^>]*>(.*?)</dl>"#)
            .expect("valid regex")
    })
}

fn anchor_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?is)<a\b[^>]*href="([^"]+)"[^>]*>"#).expect("valid regex"))
}

/// Extract downloadable attachment URLs from a filing detail page.
///
/// Only anchors inside the `announcement-attachment-list` definition list
/// count. JavaScript popup links and fragment links are skipped, relative
/// links are resolved against `base_url`, and the file-open indirection is
/// rewritten into the direct download form. When the page carries the
/// fallback-link phrase and exactly two attachments survive, the first is
/// the duplicate and is dropped.
pub fn extract_attachment_urls(html: &str, base_url: &str) -> Vec<String> {
    let Some(block) = attachment_block_re()
        .captures(html)
        .and_then(|c| c.get(1))
    else {
        return Vec::new();
    };

    let mut attachments = Vec::new();
    for capture in anchor_re().captures_iter(block.as_str()) {
        let anchor = capture.get(0).map(|m| m.as_str()).unwrap_or_default();
        let href = capture.get(1).map(|m| m.as_str()).unwrap_or_default();

        if href.contains('#') || anchor.to_lowercase().contains("window.open") {
            continue;
        }

        let absolute = if href.starts_with('/') {
            match Url::parse(base_url).and_then(|base| base.join(href)) {
                Ok(url) => url.to_string(),
                Err(e) => {
                    debug!(href, error = %e, "Skipping unresolvable attachment link");
                    continue;
                }
            }
        } else {
            href.to_string()
        };

        attachments.push(
            absolute
                .replace("/FileOpen/", "/")
                .replace("?App=Announcement&FileID=", "_"),
        );
    }

    if attachments.len() == 2 && html.to_lowercase().contains(FALLBACK_LINK_PHRASE) {
        attachments.remove(0);
    }

    attachments
}

/// Derive a storage file name from a formatted attachment URL: the last
/// path segment with its leading `FileOpen` stem dropped and URL
/// punctuation flattened to underscores.
pub fn attachment_file_name(url: &str) -> String {
    let last = url.rsplit('/').next().unwrap_or(url);
    let parts: Vec<&str> = last.split('_').collect();
    let mut name = if parts.len() > 1 {
        parts[1..].join("_")
    } else {
        last.to_string()
    };
    for (from, to) in [("%20", "_"), (":", "_"), ("?", "_"), ("&", "_"), ("=", "_")] {
        name = name.replace(from, to);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://links.sgx.com";

    fn page(list_items: &str, trailer: &str) -> String {
        format!(
            r#"<html><body><div>Announcement</div>
            <dl class="announcement-attachment-list">{list_items}</dl>
            {trailer}</body></html>"#
        )
    }

    #[test]
    fn extracts_and_rewrites_relative_links() {
        let html = page(
            r#"<dt>Attachments</dt>
               <dd><a href="/FileOpen/results.pdf?App=Announcement&FileID=12345">Results</a></dd>"#,
            "",
        );
        let urls = extract_attachment_urls(&html, BASE);
        assert_eq!(urls, vec!["https://links.sgx.com/results.pdf_12345"]);
    }

    #[test]
    fn skips_popup_and_fragment_links() {
        let html = page(
            r##"<dd><a href="#top">Back to top</a></dd>
               <dd><a href="/FileOpen/a.pdf?App=Announcement&FileID=1" onClick="JavaScript:window.open('x')">Popup</a></dd>
               <dd><a href="https://links.sgx.com/FileOpen/b.pdf?App=Announcement&FileID=2">Real</a></dd>"##,
            "",
        );
        let urls = extract_attachment_urls(&html, BASE);
        assert_eq!(urls, vec!["https://links.sgx.com/b.pdf_2"]);
    }

    #[test]
    fn fallback_phrase_drops_first_of_two() {
        let html = page(
            r#"<dd><a href="/FileOpen/inline.pdf?App=Announcement&FileID=1">Inline</a></dd>
               <dd><a href="/FileOpen/direct.pdf?App=Announcement&FileID=2">Direct</a></dd>"#,
            "<p>If you are unable to view the above file, please click the link below.</p>",
        );
        let urls = extract_attachment_urls(&html, BASE);
        assert_eq!(urls, vec!["https://links.sgx.com/direct.pdf_2"]);
    }

    #[test]
    fn page_without_attachment_list_yields_nothing() {
        let html = r#"<html><body><a href="/FileOpen/a.pdf?App=Announcement&FileID=1">a</a></body></html>"#;
        assert!(extract_attachment_urls(html, BASE).is_empty());
    }

    #[test]
    fn file_name_drops_stem_and_flattens_punctuation() {
        assert_eq!(
            attachment_file_name("https://links.sgx.com/results.pdf_12345"),
            "12345"
        );
        // Segments without the underscore indirection keep their full name.
        assert_eq!(
            attachment_file_name("https://links.sgx.com/plain%20report.pdf"),
            "plain_report.pdf"
        );
    }
}
