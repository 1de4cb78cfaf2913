//! End-to-end tests for page display, partials, security and AJAX.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cms_rs_core::content::{CachePolicy, EngineKind, Protocol};
use cms_rs_core::{
    CallStackFrame, CmsError, CmsRequest, CmsResult, Customer, GlobalContentBlock, Layout,
    ObjectType, Page, Partial, SecurityMode, Settings, Theme,
};
use cms_rs_render::evaluator::MAX_NESTING_DEPTH;
use cms_rs_render::{
    ActionRegistry, AjaxOutcome, Controller, InMemoryRepository, RenderOutcome, Site, StaticThemes,
    TicketIssuer,
};
use cms_rs_signals::{CmsHooks, PageNotFoundEvent, RouteEvent, RouteOverride};
use cms_rs_template::TemplateServices;

struct FixedTicket;

impl TicketIssuer for FixedTicket {
    fn issue(&self, _request: &CmsRequest) -> String {
        "T1".to_string()
    }
}

struct Fixture {
    repo: Arc<InMemoryRepository>,
    actions: Arc<ActionRegistry>,
    hooks: Arc<CmsHooks>,
    settings: Settings,
}

impl Fixture {
    fn new() -> Self {
        Self {
            repo: Arc::new(InMemoryRepository::new(Arc::default())),
            actions: Arc::new(ActionRegistry::new()),
            hooks: Arc::new(CmsHooks::new()),
            settings: Settings {
                debug: false,
                ..Settings::default()
            },
        }
    }

    fn page(&self, page: Page) -> &Self {
        self.repo.insert_page(page).unwrap();
        self
    }

    fn partial(&self, name: &str, content: &str) -> &Self {
        self.repo.insert_partial(Partial::new(name, content)).unwrap();
        self
    }

    fn site(&self) -> Site {
        Site::builder(self.settings.clone())
            .versions(Arc::clone(self.repo.versions()))
            .repository(Arc::clone(&self.repo) as _)
            .actions(Arc::clone(&self.actions) as _)
            .tickets(Arc::new(FixedTicket))
            .hooks(Arc::clone(&self.hooks))
            .build()
            .unwrap()
    }
}

fn page(id: u64, url: &str, content: &str) -> Page {
    let mut page = Page::new(id, url, format!("Page {id}"));
    page.content = content.to_string();
    page
}

fn frames(frames: &[CallStackFrame]) -> Vec<(ObjectType, String)> {
    frames
        .iter()
        .map(|frame| (frame.object_type, frame.name.clone()))
        .collect()
}

// ═════════════════════════════════════════════════════════════════════
// 1. Engine failures are attributed to the full nesting of sources
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_nested_partial_failure_carries_three_frames() {
    let fx = Fixture::new();
    fx.page(page(1, "/", "top <? $this->render_partial('outer') ?>"))
        .partial("outer", "o <? $this->render_partial('inner') ?>")
        .partial("inner", "line one\n<?= $undefined ?>");

    let err = fx.site().display(CmsRequest::new("/")).unwrap_err();
    let CmsError::Execution(e) = err else {
        panic!("expected an execution error, got {err:?}");
    };
    assert_eq!(
        frames(&e.call_stack),
        vec![
            (ObjectType::Page, "Page 1".to_string()),
            (ObjectType::Partial, "outer".to_string()),
            (ObjectType::Partial, "inner".to_string()),
        ]
    );
    assert_eq!(e.line, Some(2));
    assert!(e.trace().starts_with("CMS partial \"inner\" (line 2)"));
}

#[test]
fn test_layout_failure_is_attributed_to_layout_chain() {
    let fx = Fixture::new();
    let mut home = page(1, "/", "content");
    home.layout_id = Some(3);
    fx.page(home)
        .partial("header", "<? $this->render_partial('menu') ?>")
        .partial("menu", "<? nonexistent_helper() ?>");
    fx.repo.insert_layout(Layout::new(
        3,
        "main",
        "<html><? $this->render_partial('header') ?><? $this->render_page() ?></html>",
    ));

    let err = fx.site().display(CmsRequest::new("/")).unwrap_err();
    let CmsError::Execution(e) = err else {
        panic!("expected an execution error, got {err:?}");
    };
    assert_eq!(
        frames(&e.call_stack),
        vec![
            (ObjectType::Template, "main".to_string()),
            (ObjectType::Partial, "header".to_string()),
            (ObjectType::Partial, "menu".to_string()),
        ]
    );
}

#[test]
fn test_self_rendering_partial_stops_at_nesting_limit() {
    let fx = Fixture::new();
    fx.page(page(1, "/", "<? $this->render_partial('loop') ?>"))
        .partial("loop", "x<? $this->render_partial('loop') ?>");

    let err = fx.site().display(CmsRequest::new("/")).unwrap_err();
    let CmsError::Execution(e) = err else {
        panic!("expected an execution error, got {err:?}");
    };
    assert!(e.message.contains("Maximum nesting depth"), "{}", e.message);
    assert_eq!(e.call_stack.len(), MAX_NESTING_DEPTH);
    assert_eq!(e.failing_frame().unwrap().name, "loop");
}

// ═════════════════════════════════════════════════════════════════════
// 2. Page cache: hits skip evaluation, version bumps invalidate
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_page_cache_hit_skips_actions_until_content_changes() {
    let fx = Fixture::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    fx.actions.register_action(
        "shop:home",
        Arc::new(move |controller: &Controller| -> CmsResult<()> {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            controller.set_data("n", serde_json::json!(n));
            Ok(())
        }),
    );

    let mut home = page(1, "/", "render <?= $n ?>");
    home.action_reference = "shop:home".into();
    home.cache_policy = Some(CachePolicy {
        vary_by: vec![],
        versions: vec!["cms".into()],
        ttl_seconds: Some(600),
    });
    fx.page(home);
    let site = fx.site();

    let first = site.display(CmsRequest::new("/")).unwrap();
    let second = site.display(CmsRequest::new("/")).unwrap();
    assert_eq!(first, RenderOutcome::Rendered("render 1".into()));
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    fx.partial("unrelated", "x");
    let third = site.display(CmsRequest::new("/")).unwrap();
    assert_eq!(third, RenderOutcome::Rendered("render 2".into()));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_page_cache_varies_by_url() {
    let fx = Fixture::new();
    let mut shop = page(1, "/shop", "<?= $this->request_param(0, 'all') ?>");
    shop.cache_policy = Some(CachePolicy::default());
    fx.page(shop);
    let site = fx.site();

    assert_eq!(
        site.display(CmsRequest::new("/shop/shoes")).unwrap().body(),
        Some("shoes")
    );
    assert_eq!(
        site.display(CmsRequest::new("/shop/hats")).unwrap().body(),
        Some("hats")
    );
}

// ═════════════════════════════════════════════════════════════════════
// 3. Security
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_protocol_mismatch_redirects_with_ticket() {
    let fx = Fixture::new();
    let mut checkout = page(1, "/checkout", "pay");
    checkout.protocol = Protocol::Https;
    fx.page(checkout);

    let request = CmsRequest::from_uri("/checkout/step/2?coupon=A1").with_host("shop.example");
    assert_eq!(
        fx.site().display(request).unwrap(),
        RenderOutcome::Redirect(
            "https://shop.example/checkout/step/2/?coupon=A1&cms_ticket=T1".into()
        )
    );

    let secure = CmsRequest::new("/checkout").with_protocol("https");
    assert_eq!(fx.site().display(secure).unwrap().body(), Some("pay"));
}

#[test]
fn test_customers_only_page_redirects_guests_to_login() {
    let fx = Fixture::new();
    let mut account = page(1, "/account", "orders");
    account.security_mode = SecurityMode::Customers;
    account.security_redirect_id = Some(2);
    fx.page(page(2, "/login", "login")).page(account);
    let site = fx.site();

    assert_eq!(
        site.display(CmsRequest::new("/account")).unwrap(),
        RenderOutcome::Redirect("/login/%7Caccount".into())
    );

    let signed_in = CmsRequest::new("/account").with_customer(Customer::new(9, "Ann"));
    assert_eq!(site.display(signed_in).unwrap().body(), Some("orders"));
}

#[test]
fn test_unreachable_page_without_redirect_is_denied() {
    let fx = Fixture::new();
    let mut hidden = page(1, "/hidden", "secret");
    hidden.protocol = Protocol::None;
    fx.page(hidden);
    assert_eq!(
        fx.site().display(CmsRequest::new("/hidden")).unwrap(),
        RenderOutcome::Denied
    );
}

// ═════════════════════════════════════════════════════════════════════
// 4. Recoverable action errors and tracking injection
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_business_error_becomes_flash_and_render_continues() {
    let fx = Fixture::new();
    fx.actions.register_action(
        "shop:add",
        Arc::new(|_: &Controller| -> CmsResult<()> {
            Err(CmsError::BusinessLogic("Out of stock".into()))
        }),
    );
    let mut product = page(1, "/product", "<?= $after ?>|<?= $flash_error ?>");
    product.action_reference = "shop:add".into();
    product.post_action = "$this->data['after'] = 'post ran';".into();
    fx.page(product);

    assert_eq!(
        fx.site().display(CmsRequest::new("/product")).unwrap().body(),
        Some("post ran|Out of stock")
    );
}

#[test]
fn test_tracking_code_is_spliced_before_first_head_close() {
    let mut fx = Fixture::new();
    fx.settings.analytics.enabled = true;
    fx.settings.analytics.property_id = "UA-77".into();
    fx.page(page(
        1,
        "/",
        "<html><head><title>t</title></HEAD><body><pre></head></pre></body></html>",
    ));

    let html = fx
        .site()
        .display(CmsRequest::new("/"))
        .unwrap()
        .body()
        .unwrap()
        .to_string();
    let create = html.find("ga('create', 'UA-77'").unwrap();
    let send = html.find("ga('send', 'pageview');").unwrap();
    let head_close = html.find("</HEAD>").unwrap();
    assert!(create < send && send < head_close);
    assert!(html.ends_with("<body><pre></head></pre></body></html>"));
    assert_eq!(html.matches("analytics.js").count(), 1);
}

// ═════════════════════════════════════════════════════════════════════
// 5. Themes select the structured engine for templates
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_structured_theme_renders_templates_and_keeps_code_for_actions() {
    let fx = Fixture::new();
    let mut theme = Theme::new(4, "autumn");
    theme.templating_engine = Some(EngineKind::Structured);

    let mut home = page(1, "/", r#"{{ render_partial(name="greet") }}!"#);
    home.theme_id = Some(4);
    home.pre_action = "$this->data['who'] = 'Ann';".into();
    fx.page(home);
    let mut greet = Partial::new("greet", "Hi {{ who }}");
    greet.theme_id = Some(4);
    fx.repo.insert_partial(greet).unwrap();

    let site = Site::builder(fx.settings.clone())
        .repository(Arc::clone(&fx.repo) as _)
        .themes(Arc::new(StaticThemes::with_active(theme)))
        .build()
        .unwrap();
    assert_eq!(
        site.display(CmsRequest::new("/")).unwrap().body(),
        Some("Hi Ann!")
    );
}

// ═════════════════════════════════════════════════════════════════════
// 6. AJAX
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_ajax_updates_follow_request_order() {
    let fx = Fixture::new();
    let mut cart = page(1, "/cart", "");
    cart.ajax_handlers =
        "function on_add($page, $params) { $this->data['qty'] = count($params) + 1; }".into();
    fx.page(cart)
        .partial("mini", "[<?= $qty ?>]")
        .partial("summary", "summary");

    let updates = vec![
        ("summary-box".to_string(), "summary".to_string()),
        ("mini-box".to_string(), "mini".to_string()),
    ];
    let outcome = fx
        .site()
        .handle_ajax(CmsRequest::new("/cart/x"), "on_add", &updates)
        .unwrap();
    assert_eq!(
        outcome,
        AjaxOutcome::Patch(">>summary-box<<summary>>mini-box<<[2]".into())
    );
}

#[test]
fn test_ajax_engine_error_goes_through_error_channel() {
    let mut fx = Fixture::new();
    fx.settings.debug = true;
    fx.page(page(1, "/cart", "")).partial("broken", "<?= $nope ?>");

    let updates = vec![("box".to_string(), "broken".to_string())];
    let outcome = fx
        .site()
        .handle_ajax(CmsRequest::new("/cart"), "on_action", &updates)
        .unwrap();
    let AjaxOutcome::Error(body) = outcome else {
        panic!("expected an AJAX error, got {outcome:?}");
    };
    assert!(body.starts_with("@AJAX-ERROR@"));
    assert!(body.contains("Undefined variable: nope"));
    assert!(!body.contains(">>box<<"));
}

#[test]
fn test_ajax_respects_page_security() {
    let fx = Fixture::new();
    let mut account = page(1, "/account", "");
    account.security_mode = SecurityMode::Customers;
    account.security_redirect_id = Some(2);
    fx.page(page(2, "/login", "")).page(account);

    let outcome = fx
        .site()
        .handle_ajax(CmsRequest::new("/account"), "on_action", &[])
        .unwrap();
    assert_eq!(outcome, AjaxOutcome::Redirect("/login/%7Caccount".into()));
}

// ═════════════════════════════════════════════════════════════════════
// 7. Routing hooks and the not-found page
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_before_route_overrides_the_router() {
    let fx = Fixture::new();
    fx.page(page(1, "/", "home"));
    fx.hooks.before_route.connect(
        "ipad",
        Arc::new(|event: &RouteEvent| {
            (event.path == "/ipad").then(|| RouteOverride {
                page: page(9, "/product", "product <?= $this->request_param(0) ?>"),
                params: vec!["ipad".to_string()],
            })
        }),
    );

    let site = fx.site();
    assert_eq!(
        site.display(CmsRequest::new("/ipad")).unwrap(),
        RenderOutcome::Rendered("product ipad".into())
    );
    assert_eq!(
        site.display(CmsRequest::new("/")).unwrap(),
        RenderOutcome::Rendered("home".into())
    );
}

#[test]
fn test_unrouted_request_renders_the_404_page() {
    let fx = Fixture::new();
    fx.page(page(1, "/shop", "shop"))
        .page(page(2, "/404", "<h1>Nothing at <?= $this->request_param(0, 'this address') ?></h1>"));
    let misses = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&misses);
    fx.hooks.page_not_found.connect(
        "count",
        Arc::new(move |_: &PageNotFoundEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            None
        }),
    );

    let outcome = fx.site().display(CmsRequest::new("/missing")).unwrap();
    assert_eq!(
        outcome,
        RenderOutcome::NotFound("<h1>Nothing at this address</h1>".into())
    );
    assert_eq!(misses.load(Ordering::SeqCst), 1);
}

#[test]
fn test_page_not_found_hook_can_suppress_the_404_page() {
    let fx = Fixture::new();
    fx.page(page(1, "/shop", "shop")).page(page(2, "/404", "not found"));
    fx.hooks
        .page_not_found
        .connect("bypass", Arc::new(|_: &PageNotFoundEvent| Some(true)));

    let err = fx.site().display(CmsRequest::new("/missing")).unwrap_err();
    assert!(matches!(err, CmsError::NotFound(_)));
}

#[test]
fn test_unrouted_request_without_404_page_is_an_error() {
    let fx = Fixture::new();
    fx.page(page(1, "/shop", "shop"));
    let err = fx.site().display(CmsRequest::new("/missing")).unwrap_err();
    assert!(matches!(err, CmsError::NotFound(_)));
}

// ═════════════════════════════════════════════════════════════════════
// 8. Global content blocks
// ═════════════════════════════════════════════════════════════════════

#[test]
fn test_global_block_renders_and_edits_invalidate_cached_pages() {
    let fx = Fixture::new();
    let mut home = page(1, "/", "<footer><?= $this->global_content('Footer') ?></footer>");
    home.cache_policy = Some(CachePolicy {
        vary_by: vec![],
        versions: vec!["cms".into()],
        ttl_seconds: Some(600),
    });
    fx.page(home);
    fx.repo
        .insert_global_block(GlobalContentBlock::new("footer", "(c) 2024"))
        .unwrap();

    let site = fx.site();
    assert_eq!(
        site.display(CmsRequest::new("/")).unwrap(),
        RenderOutcome::Rendered("<footer>(c) 2024</footer>".into())
    );

    fx.repo
        .insert_global_block(GlobalContentBlock::new("footer", "(c) 2025"))
        .unwrap();
    assert_eq!(
        site.display(CmsRequest::new("/")).unwrap(),
        RenderOutcome::Rendered("<footer>(c) 2025</footer>".into())
    );
}
