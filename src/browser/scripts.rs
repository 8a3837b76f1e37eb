use crate::browser::locators::{LocatorRole, Locators};

/// In-page JavaScript rendered from a [`Locators`] set.
///
/// Every script is a self-invoking expression so it can be handed to
/// `BrowserDriver::evaluate` as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageScripts {
    /// Returns the scroller's `scrollTop`, or 0 when the scroller is absent
    pub scroll_position: String,
    /// Moves the scroller up by one viewport height, clamped at 0
    pub scroll_up: String,
    pub scroll_to_bottom: String,
    /// Returns every rendered message element in DOM order
    pub snapshot: String,
}

/// Render a selector as a JavaScript string literal.
fn js_str(selector: &str) -> String {
    serde_json::to_string(selector).unwrap_or_else(|_| "''".to_string())
}

impl PageScripts {
    pub fn new(locators: &Locators) -> Self {
        let scroller = js_str(locators.selector(LocatorRole::Scroller));

        let scroll_position = format!(
            r#"(() => {{
                const scroller = document.querySelector({scroller});
                return scroller ? scroller.scrollTop : 0;
            }})()"#
        );

        let scroll_up = format!(
            r#"(() => {{
                const scroller = document.querySelector({scroller});
                if (scroller) {{
                    scroller.scrollTop = Math.max(0, scroller.scrollTop - window.innerHeight);
                }}
                return null;
            }})()"#
        );

        let scroll_to_bottom = format!(
            r#"(() => {{
                const scroller = document.querySelector({scroller});
                if (scroller) {{
                    scroller.scrollTop = scroller.scrollHeight;
                }}
                return null;
            }})()"#
        );

        Self {
            scroll_position,
            scroll_up,
            scroll_to_bottom,
            snapshot: Self::snapshot_script(locators),
        }
    }

    /// Script returning how many elements match `selector`.
    pub fn element_count(selector: &str) -> String {
        format!(
            "document.querySelectorAll({}).length",
            js_str(selector)
        )
    }

    fn snapshot_script(locators: &Locators) -> String {
        let item = js_str(locators.selector(LocatorRole::MessageItem));
        let author = js_str(locators.selector(LocatorRole::Author));
        let avatar = js_str(locators.selector(LocatorRole::AuthorAvatar));
        let timestamp = js_str(locators.selector(LocatorRole::Timestamp));
        let edited = js_str(locators.selector(LocatorRole::EditedTimestamp));
        let content = js_str(locators.selector(LocatorRole::Content));
        let attachment = js_str(locators.selector(LocatorRole::Attachment));
        let thread = js_str(locators.selector(LocatorRole::ThreadLink));

        format!(
            r#"(() => {{
                const text = (el) => (el ? el.textContent.trim() : null);
                const attr = (el, name) => (el ? el.getAttribute(name) : null);
                return Array.from(document.querySelectorAll({item})).map((el) => {{
                    const edited = el.querySelector({edited});
                    let time = null;
                    for (const candidate of el.querySelectorAll({timestamp})) {{
                        if (!edited || candidate !== edited) {{
                            time = candidate;
                            break;
                        }}
                    }}
                    const content = el.querySelector({content});
                    return {{
                        elementId: el.id || '',
                        authorName: text(el.querySelector({author})),
                        avatarUrl: attr(el.querySelector({avatar}), 'src'),
                        timestamp: attr(time, 'datetime'),
                        editedTimestamp: attr(edited, 'datetime'),
                        content: content ? content.innerText.trim() : '',
                        attachments: Array.from(el.querySelectorAll({attachment}))
                            .map((a) => a.getAttribute('href') || a.getAttribute('src'))
                            .filter(Boolean),
                        threadHref: attr(el.querySelector({thread}), 'href'),
                    }};
                }});
            }})()"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_embed_locators() {
        let scripts = PageScripts::new(&Locators::default());

        assert!(scripts.scroll_position.contains("scrollerInner"));
        assert!(scripts.scroll_up.contains("window.innerHeight"));
        assert!(scripts.scroll_to_bottom.contains("scrollHeight"));
        assert!(scripts.snapshot.contains("chat-messages-"));
        assert!(scripts.snapshot.contains("elementId"));
    }

    #[test]
    fn test_selectors_are_escaped() {
        let locators = Locators {
            scroller: "div[data-x='a\"b']".to_string(),
            ..Default::default()
        };
        let scripts = PageScripts::new(&locators);
        assert!(scripts.scroll_position.contains(r#""div[data-x='a\"b']""#));
    }

    #[test]
    fn test_element_count_script() {
        assert_eq!(
            PageScripts::element_count("li"),
            r#"document.querySelectorAll("li").length"#
        );
    }
}
