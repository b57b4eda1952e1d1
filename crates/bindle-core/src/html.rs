//! HTML page rendering.
//!
//! Injects stylesheet links and script tags into a user template or a
//! generated skeleton. Script tags land before `</body>`, links before
//! `</head>`; a template missing either marker gets the tags appended.

/// Page rendering options.
#[derive(Debug, Clone)]
pub struct HtmlOptions {
    /// `<title>` for the generated skeleton. A user template keeps its own.
    pub title: String,
    /// Collapse whitespace between tags.
    pub minimize: bool,
}

/// Render the page: `template` if given, otherwise a skeleton with a
/// `#root` mount point.
#[must_use]
pub fn render_page(
    template: Option<&str>,
    scripts: &[String],
    styles: &[String],
    options: &HtmlOptions,
) -> String {
    let base = match template {
        Some(t) => t.to_string(),
        None => skeleton(&options.title),
    };

    let links: String = styles
        .iter()
        .map(|href| format!("<link rel=\"stylesheet\" href=\"{href}\">\n"))
        .collect();
    let tags: String = scripts
        .iter()
        .map(|src| format!("<script src=\"{src}\"></script>\n"))
        .collect();

    let html = inject_before(&base, "</head>", &links);
    let html = inject_before(&html, "</body>", &tags);

    if options.minimize {
        minimize(&html)
    } else {
        html
    }
}

fn skeleton(title: &str) -> String {
    format!(
        r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<div id="root"></div>
</body>
</html>
"#
    )
}

/// Insert `content` before the first case-insensitive occurrence of
/// `marker`, or append it when the marker is missing.
fn inject_before(html: &str, marker: &str, content: &str) -> String {
    if content.is_empty() {
        return html.to_string();
    }
    let lower = html.to_ascii_lowercase();
    match lower.find(marker) {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + content.len());
            out.push_str(&html[..pos]);
            out.push_str(content);
            out.push_str(&html[pos..]);
            out
        }
        None => {
            let mut out = html.to_string();
            out.push_str(content);
            out
        }
    }
}

/// Collapse inter-tag whitespace and trim lines.
fn minimize(html: &str) -> String {
    let joined: String = html
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    joined.replace(">\n<", "><")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(minimize: bool) -> HtmlOptions {
        HtmlOptions {
            title: "Test".to_string(),
            minimize,
        }
    }

    #[test]
    fn test_skeleton_injection() {
        let html = render_page(
            None,
            &["/index.js".to_string()],
            &["/app.css".to_string()],
            &opts(false),
        );
        assert!(html.contains("<title>Test</title>"));
        assert!(html.contains("<div id=\"root\"></div>"));

        let link_pos = html.find("href=\"/app.css\"").unwrap();
        let head_close = html.find("</head>").unwrap();
        assert!(link_pos < head_close);

        let script_pos = html.find("src=\"/index.js\"").unwrap();
        let body_close = html.find("</body>").unwrap();
        assert!(script_pos < body_close);
    }

    #[test]
    fn test_template_kept() {
        let template = "<!doctype html><html><head><title>Mine</title></head><body><main></main></body></html>";
        let html = render_page(Some(template), &["/index.js".to_string()], &[], &opts(false));
        assert!(html.contains("<title>Mine</title>"));
        assert!(html.contains("<main></main>"));
        assert!(html.contains("<script src=\"/index.js\"></script>"));
    }

    #[test]
    fn test_template_without_markers_appends() {
        let html = render_page(Some("<p>bare</p>"), &["/a.js".to_string()], &[], &opts(false));
        assert!(html.starts_with("<p>bare</p>"));
        assert!(html.contains("<script src=\"/a.js\">"));
    }

    #[test]
    fn test_multiple_scripts_in_order() {
        let html = render_page(
            None,
            &["/shared.js".to_string(), "/index.js".to_string()],
            &[],
            &opts(false),
        );
        let shared = html.find("/shared.js").unwrap();
        let index = html.find("/index.js").unwrap();
        assert!(shared < index);
    }

    #[test]
    fn test_minimize_collapses_between_tags() {
        let html = render_page(None, &[], &[], &opts(true));
        assert!(html.contains("</head><body>"));
        assert!(!html.contains("\n<head>"));
    }
}
