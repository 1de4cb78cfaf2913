//! Analytics tracking snippets and their injection into rendered pages.

use once_cell::sync::Lazy;
use regex::Regex;

use cms_rs_core::settings::AnalyticsSettings;

static HEAD_CLOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</head>").expect("valid head regex"));

/// The loader snippet queued before the page is rendered.
pub fn opening_snippet(settings: &AnalyticsSettings) -> String {
    let rate = settings.site_speed_sample_rate.max(1);
    let mut fields = format!("'siteSpeedSampleRate': {rate}");
    if let Some(domain) = settings.cookie_domain.as_deref().filter(|d| !d.is_empty()) {
        let domain = js_escape(domain);
        fields.push_str(&format!(
            ", 'cookieDomain': '{domain}', 'legacyCookieDomain': '{domain}'"
        ));
    }
    format!(
        "\n<script type=\"text/javascript\">\n\
         (function(i,s,o,g,r,a,m){{i['GoogleAnalyticsObject']=r;i[r]=i[r]||function(){{\n\
         (i[r].q=i[r].q||[]).push(arguments)}},i[r].l=1*new Date();a=s.createElement(o),\n\
         m=s.getElementsByTagName(o)[0];a.async=1;a.src=g;m.parentNode.insertBefore(a,m)\n\
         }})(window,document,'script','//www.google-analytics.com/analytics.js','ga');\n\
         ga('create', '{}', {{{fields}}});\n",
        js_escape(&settings.property_id)
    )
}

/// The closing snippet appended once the full page has been rendered.
pub fn closing_snippet(settings: &AnalyticsSettings) -> String {
    let mut code = String::new();
    if settings.display_features {
        code.push_str("ga('require', 'displayfeatures');\n");
    }
    code.push_str("ga('send', 'pageview');\n</script>\n");
    code
}

/// Inserts `code` right before the first `</head>` (any case). Pages without
/// a head tag are returned unchanged.
///
/// ```
/// use cms_rs_render::tracking::splice_before_head;
///
/// let html = "<html><HEAD><title>x</title></HEAD><body></body></html>";
/// assert_eq!(
///     splice_before_head(html, "<script></script>"),
///     "<html><HEAD><title>x</title><script></script></HEAD><body></body></html>"
/// );
/// ```
pub fn splice_before_head(html: &str, code: &str) -> String {
    match HEAD_CLOSE_RE.find(html) {
        Some(m) => {
            let mut out = String::with_capacity(html.len() + code.len());
            out.push_str(&html[..m.start()]);
            out.push_str(code);
            out.push_str(&html[m.start()..]);
            out
        }
        None => html.to_string(),
    }
}

fn js_escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace('\n', "\\n")
        .replace('<', "\\x3c")
}
