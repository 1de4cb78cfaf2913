//! Integration tests: both engines driven through one re-entrant service
//! surface that resolves partials by evaluating them again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use serde_json::{json, Value};

use cms_rs_core::call_stack::ObjectType;
use cms_rs_core::content::EngineKind;
use cms_rs_core::options::{CombineOptions, PartialOptions};
use cms_rs_core::settings::TemplatingSettings;
use cms_rs_core::{CmsError, CmsResult, Scope};
use cms_rs_template::{EngineSelector, SourceUnit, TemplateServices};

struct MiniSite {
    selector: EngineSelector,
    kind: EngineKind,
    partials: HashMap<&'static str, &'static str>,
    buffers: Mutex<Vec<String>>,
    data: Mutex<Scope>,
    this: Weak<MiniSite>,
}

impl MiniSite {
    fn new(kind: EngineKind, partials: &[(&'static str, &'static str)]) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            selector: EngineSelector::from_settings(&TemplatingSettings {
                default_engine: Some(kind),
                inline_code_allowed: true,
            }),
            kind,
            partials: partials.iter().copied().collect(),
            buffers: Mutex::new(vec![String::new()]),
            data: Mutex::new(Scope::new()),
            this: this.clone(),
        })
    }

    fn evaluate(&self, object_type: ObjectType, name: &str, source: &str, scope: &Scope) -> CmsResult<()> {
        let services: Arc<dyn TemplateServices> = self.this.upgrade().expect("site alive");
        let kind = EngineSelector::select_kind(object_type, self.kind);
        self.selector
            .engine(kind)
            .render(&SourceUnit::new(object_type, name, source), scope, &services)
    }

    fn render(&self, source: &str, scope: Value) -> CmsResult<String> {
        let Value::Object(scope) = scope else {
            panic!("scope must be an object");
        };
        self.evaluate(ObjectType::Page, "page", source, &scope)?;
        Ok(self.buffers.lock().unwrap().concat())
    }
}

impl TemplateServices for MiniSite {
    fn write(&self, text: &str) {
        self.buffers.lock().unwrap().last_mut().unwrap().push_str(text);
    }

    fn begin_capture(&self) {
        self.buffers.lock().unwrap().push(String::new());
    }

    fn end_capture(&self) -> String {
        self.buffers.lock().unwrap().pop().unwrap_or_default()
    }

    fn render_partial(&self, name: &str, params: Scope, options: PartialOptions) -> CmsResult<Option<String>> {
        let source = *self
            .partials
            .get(name)
            .ok_or_else(|| CmsError::NotFound(format!("Partial \"{name}\" not found")))?;
        if options.return_output {
            self.begin_capture();
            let result = self.evaluate(ObjectType::Partial, name, source, &params);
            let output = self.end_capture();
            result.map(|()| Some(output))
        } else {
            self.evaluate(ObjectType::Partial, name, source, &params).map(|()| None)
        }
    }

    fn render_page(&self) -> CmsResult<()> {
        Ok(())
    }

    fn render_block(&self, _code: &str, default: Option<&str>) -> CmsResult<()> {
        self.write(default.unwrap_or_default());
        Ok(())
    }

    fn render_head(&self) -> CmsResult<()> {
        Ok(())
    }

    fn request_param(&self, _index: i64, default: Option<&str>) -> Option<String> {
        default.map(ToString::to_string)
    }

    fn redirect_url(&self, default: &str, _index: i64) -> String {
        default.to_string()
    }

    fn global_content(&self, code: &str) -> Option<String> {
        (code == "footer").then(|| "(c) Shop".to_string())
    }

    fn js_combine(&self, files: &[String], _options: &CombineOptions, _show_tag: bool) -> String {
        files.join("+")
    }

    fn css_combine(&self, files: &[String], _options: &CombineOptions, _show_tag: bool) -> String {
        files.join("+")
    }

    fn data(&self) -> Scope {
        self.data.lock().unwrap().clone()
    }

    fn set_data(&self, key: &str, value: Value) {
        self.data.lock().unwrap().insert(key.to_string(), value);
    }
}

// ═════════════════════════════════════════════════════════════════════
// 1. Nested partials interleave with the caller's output
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_code_engine_nested_partials_keep_order() {
    let site = MiniSite::new(
        EngineKind::Code,
        &[
            ("menu", "<ul><? foreach ($items as $i): ?><? $this->render_partial('item', ['label' => $i]) ?><? endforeach ?></ul>"),
            ("item", "<li><?= h($label) ?></li>"),
        ],
    );
    let out = site
        .render(
            "<nav><? $this->render_partial('menu', ['items' => $links]) ?></nav>",
            json!({"links": ["Home", "A&B"]}),
        )
        .unwrap();
    assert_eq!(out, "<nav><ul><li>Home</li><li>A&amp;B</li></ul></nav>");
}

#[test]
fn test_structured_engine_nested_partials_keep_order() {
    let site = MiniSite::new(
        EngineKind::Structured,
        &[
            ("menu", "<ul>{% for i in items %}{{ render_partial(name=\"item\", params=i) }}{% endfor %}</ul>"),
            ("item", "<li>{{ label }}</li>"),
        ],
    );
    let out = site
        .render(
            "<nav>{{ render_partial(name=\"menu\", params=menu) }}</nav>",
            json!({"menu": {"items": [{"label": "Home"}, {"label": "Shop"}]}}),
        )
        .unwrap();
    assert_eq!(out, "<nav><ul><li>Home</li><li>Shop</li></ul></nav>");
}

// ═════════════════════════════════════════════════════════════════════
// 2. Errors from deep inside a nested evaluation surface unchanged
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_code_engine_inner_diagnostic_surfaces() {
    let site = MiniSite::new(EngineKind::Code, &[("broken", "ok\n<?= $nope ?>")]);
    match site.render("<? $this->render_partial('broken') ?>", json!({})) {
        Err(CmsError::Engine(e)) => {
            assert_eq!(e.message, "Undefined variable: nope");
            assert_eq!(e.line, Some(2));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_structured_engine_missing_partial_surfaces() {
    let site = MiniSite::new(EngineKind::Structured, &[]);
    assert!(matches!(
        site.render("{{ render_partial(name=\"ghost\") }}", json!({})),
        Err(CmsError::NotFound(_))
    ));
}

// ═════════════════════════════════════════════════════════════════════
// 3. Action code always runs on the inline-code engine
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_action_code_uses_code_engine_under_structured_theme() {
    let site = MiniSite::new(EngineKind::Structured, &[]);
    site.evaluate(
        ObjectType::PreActionCode,
        "page",
        "$this->data['greeting'] = 'hi';",
        &Scope::new(),
    )
    .unwrap();
    assert_eq!(site.data()["greeting"], json!("hi"));
}

// ═════════════════════════════════════════════════════════════════════
// 4. Global content blocks are reachable from both engines
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_global_content_from_code_engine() {
    let site = MiniSite::new(EngineKind::Code, &[]);
    let out = site
        .render(
            "<footer><?= $this->global_content('footer') ?>|<?= $this->global_content('nope') ?: 'none' ?></footer>",
            json!({}),
        )
        .unwrap();
    assert_eq!(out, "<footer>(c) Shop|none</footer>");
}

#[test]
fn test_global_content_from_structured_engine() {
    let site = MiniSite::new(EngineKind::Structured, &[]);
    let out = site
        .render("<footer>{{ global_content(code=\"footer\") }}</footer>", json!({}))
        .unwrap();
    assert_eq!(out, "<footer>(c) Shop</footer>");
}
