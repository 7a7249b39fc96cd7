use browser_snapshot::actions::perform_understudy_method;
use browser_snapshot::locator::{backend_node_of, release_element, resolve_locator};
use browser_snapshot::{ActOptions, Action, BrowserSession, Deadline, LaunchOptions, SnapshotOptions};

const NESTED_PAGE: &str = "data:text/html,<html><body><h1>Outer</h1>\
<iframe srcdoc=\"<html><body><p>Middle</p><iframe srcdoc='<button id=go>Go</button>'></iframe></body></html>\"></iframe>\
</body></html>";

fn launch() -> BrowserSession {
    BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser")
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_nested_iframes_are_injected() {
    let session = launch();
    session.navigate(NESTED_PAGE).expect("Failed to navigate");
    std::thread::sleep(std::time::Duration::from_millis(500));

    let snapshot = session.capture_snapshot(&SnapshotOptions::default()).expect("Failed to snapshot");
    println!("{}", snapshot.combined_tree);

    assert_eq!(snapshot.per_frame.len(), 3);
    assert!(snapshot.combined_tree.contains("Outer"));
    assert!(snapshot.combined_tree.contains("Middle"));
    assert!(snapshot.combined_tree.contains("button: Go"));

    let button = snapshot
        .combined_xpath_map
        .iter()
        .find(|(_, xpath)| xpath.ends_with("button[1]"))
        .expect("button has a path");
    assert_eq!(button.0.frame_ordinal, 2);
    assert_eq!(button.1.matches("iframe[1]").count(), 2);
}

#[test]
#[ignore]
fn test_every_path_resolves_to_its_element() {
    let session = launch();
    session.navigate(NESTED_PAGE).expect("Failed to navigate");
    std::thread::sleep(std::time::Duration::from_millis(500));

    let page = session.page().expect("Failed to attach page");
    let snapshot = browser_snapshot::capture_hybrid_snapshot(&page, &SnapshotOptions::default())
        .expect("Failed to snapshot");
    let deadline = Deadline::unbounded("verify");

    for (id, xpath) in snapshot.combined_xpath_map.iter() {
        if xpath.ends_with("text()[1]") || xpath.contains("comment()") {
            continue;
        }
        let handle = resolve_locator(&page, xpath, &deadline).unwrap_or_else(|e| panic!("{} ({}): {}", id, xpath, e));
        let backend = backend_node_of(&page, &handle, &deadline).expect("backend id");
        release_element(&page, &handle, &deadline);
        assert_eq!(page.encode(&handle.frame_id, backend), *id, "{}", xpath);
    }
}

#[test]
#[ignore]
fn test_focus_selector_scopes_outline() {
    let session = launch();
    session
        .navigate("data:text/html,<html><body><nav><a href='/a'>A</a></nav><main><button>Only</button></main></body></html>")
        .expect("Failed to navigate");

    let scoped = session
        .capture_snapshot(&SnapshotOptions::new().focus("/html/body/main"))
        .expect("Failed to snapshot");
    assert!(scoped.combined_tree.contains("Only"));
    assert!(!scoped.combined_tree.contains("link"));

    let fallback = session
        .capture_snapshot(&SnapshotOptions::new().focus("//section[@id='missing']"))
        .expect("Failed to snapshot");
    assert!(fallback.combined_tree.contains("link"));
}

#[test]
#[ignore]
fn test_fill_and_click_inside_iframe() {
    let session = launch();
    session
        .navigate("data:text/html,<html><body><iframe srcdoc=\"<input id=q><button onclick='document.title=q.value'>Go</button>\"></iframe></body></html>")
        .expect("Failed to navigate");
    std::thread::sleep(std::time::Duration::from_millis(500));

    let fill = Action::new("xpath=/html/body/iframe/html/body/input", "fill").with_arguments(["hello"]);
    let result = session.act(&fill, &ActOptions::default(), None).expect("fill");
    assert!(result.success, "{}", result.message);

    let page = session.page().expect("Failed to attach page");
    let deadline = Deadline::unbounded("click");
    perform_understudy_method(&page, None, "click", "iframe >> button", &[], &deadline).expect("click");
}

#[test]
#[ignore]
fn test_page_follows_attached_iframes() {
    let session = launch();
    session.navigate("data:text/html,<html><body><p>Host</p></body></html>").expect("Failed to navigate");

    let mut page = session.page().expect("Failed to attach page");
    assert_eq!(page.registry().len(), 1);

    session
        .tab()
        .expect("active tab")
        .evaluate("document.body.appendChild(document.createElement('iframe')); true", false)
        .expect("Failed to add iframe");
    std::thread::sleep(std::time::Duration::from_millis(300));

    assert!(page.sync_frames() > 0);
    assert_eq!(page.registry().len(), 2);
}
