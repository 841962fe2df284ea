#![allow(deprecated)]
use assert_cmd::Command;
use mockito::Matcher;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn cbg(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cbg").unwrap();
    cmd.current_dir(dir.path())
        .env("CBG_ROOT", dir.path())
        .env_remove("PRINTIFY_API_TOKEN")
        .env_remove("PRINTIFY_API_BASE")
        .env_remove("PRINTIFY_SHOP_ID")
        .env_remove("SD_WEBUI_URL")
        .env_remove("CBG_BACKEND")
        .env_remove("GEMINI_API_KEY")
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GEMINI_API_BASE")
        .env_remove("GEMINI_MODEL")
        .env_remove("RUST_LOG");
    cmd
}

fn cbg_against(dir: &TempDir, server: &mockito::ServerGuard) -> Command {
    let mut cmd = cbg(dir);
    cmd.env("PRINTIFY_API_BASE", server.url())
        .env("PRINTIFY_API_TOKEN", "test-token")
        .env("PRINTIFY_SHOP_ID", "77");
    cmd
}

fn hoodie() -> serde_json::Value {
    json!({
        "id": "src",
        "title": "Goose Hoodie",
        "description": "warm",
        "blueprint_id": 77,
        "print_provider_id": 9,
        "variants": [{"id": 1, "price": 3000, "is_enabled": true}],
        "print_areas": [{
            "variant_ids": [1],
            "placeholders": [
                {"position": "front", "images": [
                    {"id": "main", "x": 0.5, "y": 0.5, "scale": 1.0, "angle": 0},
                    {"id": "badge", "x": 0.8, "y": 0.2, "scale": 0.2, "angle": 0}
                ]},
                {"position": "back", "images": [{"id": "main", "x": 0.5, "y": 0.5, "scale": 1.0, "angle": 0}]},
                {"position": "waistband", "images": [{"id": "rib", "x": 0.5, "y": 0.5, "scale": 1.0, "angle": 0}]}
            ]
        }]
    })
}

fn template() -> serde_json::Value {
    let mut t = hoodie();
    t["id"] = json!("tpl");
    t["title"] = json!("[TEMPLATE]: Pullover Hoodie");
    t
}

fn created(id: &str, title: &str) -> String {
    json!({"id": id, "title": title, "blueprint_id": 77, "print_provider_id": 9}).to_string()
}

// ---------------------------------------------------------------------------
// cbg config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_defaults_are_clean() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_rejects_bad_threshold() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".cbg")).unwrap();
    std::fs::write(
        dir.path().join(".cbg/config.yaml"),
        "classifier:\n  logo_scale_threshold: 3.0\n",
    )
    .unwrap();
    cbg(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("logo_scale_threshold"));
}

#[test]
fn config_show_json_reflects_env_override() {
    let dir = TempDir::new().unwrap();
    let out = cbg(&dir)
        .env("PRINTIFY_SHOP_ID", "999")
        .args(["--json", "config", "show"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["shop_id"], "999");
    assert_eq!(value["retry"]["max_attempts"], 3);
}

// ---------------------------------------------------------------------------
// credentials
// ---------------------------------------------------------------------------

#[test]
fn missing_token_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["inspect", "src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PRINTIFY_API_TOKEN"));
}

#[test]
fn token_file_is_used() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".env")).unwrap();
    std::fs::write(dir.path().join(".env/printify_api_key.txt"), "from-file\n").unwrap();

    let mut server = mockito::Server::new();
    let m = server
        .mock("GET", "/shops/77/products/src.json")
        .match_header("authorization", "Bearer from-file")
        .with_body(hoodie().to_string())
        .create();

    cbg(&dir)
        .env("PRINTIFY_API_BASE", server.url())
        .env("PRINTIFY_SHOP_ID", "77")
        .args(["inspect", "src"])
        .assert()
        .success();
    m.assert();
}

// ---------------------------------------------------------------------------
// cbg inspect
// ---------------------------------------------------------------------------

#[test]
fn inspect_json_reports_main_image() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products/src.json")
        .with_body(hoodie().to_string())
        .create();

    let out = cbg_against(&dir, &server)
        .args(["--json", "inspect", "src"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["main_image"]["main_id"], "main");
    assert_eq!(report["layers"].as_array().unwrap().len(), 4);
    assert_eq!(report["layers"][1]["role"], "logo");
    assert_eq!(report["layers"][3]["role"], "trim");
}

#[test]
fn inspect_unknown_product_fails() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products/nope.json")
        .with_status(404)
        .create();

    cbg_against(&dir, &server)
        .args(["inspect", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("product not found: nope"));
}

// ---------------------------------------------------------------------------
// cbg clone
// ---------------------------------------------------------------------------

#[test]
fn clone_creates_product_with_suffix() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products/src.json")
        .with_body(hoodie().to_string())
        .create();
    server
        .mock("POST", "/uploads/images.json")
        .with_body(r#"{"id":"up1"}"#)
        .create();
    let create = server
        .mock("POST", "/shops/77/products.json")
        .match_body(Matcher::PartialJson(json!({"title": "Goose Hoodie v2"})))
        .with_body(created("new1", "Goose Hoodie v2"))
        .expect(1)
        .create();

    cbg_against(&dir, &server)
        .args([
            "clone",
            "src",
            "--image",
            "https://cdn.example/art.png",
            "--suffix",
            " v2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created new1"))
        .stdout(predicate::str::contains("printify.com/app/store/77/products/new1"));
    create.assert();
}

#[test]
fn clone_surfaces_rejection_body() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products/src.json")
        .with_body(hoodie().to_string())
        .create();
    server
        .mock("POST", "/uploads/images.json")
        .with_body(r#"{"id":"up1"}"#)
        .create();
    server
        .mock("POST", "/shops/77/products.json")
        .with_status(422)
        .with_body(r#"{"errors":{"reason":"print_areas invalid"}}"#)
        .create();

    cbg_against(&dir, &server)
        .args(["clone", "src", "--image", "https://cdn.example/art.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("print_areas invalid"));
}

// ---------------------------------------------------------------------------
// cbg fabricate / batch
// ---------------------------------------------------------------------------

#[test]
fn fabricate_without_logo_artwork_still_creates() {
    let dir = TempDir::new().unwrap();
    let run = dir.path().join("artifacts/graphics/textures/20250101_000000__noir");
    std::fs::create_dir_all(&run).unwrap();
    std::fs::write(run.join("specimen.png"), b"png").unwrap();
    std::fs::write(run.join("prompt.txt"), "prompt: noir goose feathers\n").unwrap();
    std::fs::create_dir_all(dir.path().join("artifacts/graphics/logos")).unwrap();

    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products/tpl.json")
        .with_body(template().to_string())
        .create();
    let upload = server
        .mock("POST", "/uploads/images.json")
        .with_body(r#"{"id":"up-tex"}"#)
        .expect(1)
        .create();
    let create = server
        .mock("POST", "/shops/77/products.json")
        .match_body(Matcher::PartialJson(json!({
            "title": "CBG Studio | Pullover Hoodie | Noir Goose Feathers"
        })))
        .with_body(created("fab1", "CBG Studio | Pullover Hoodie | Noir Goose Feathers"))
        .expect(1)
        .create();

    cbg_against(&dir, &server)
        .args(["fabricate", "--template", "tpl"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created fab1"));
    upload.assert();
    create.assert();
}

#[test]
fn batch_with_no_templates_fails() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products.json")
        .match_query(Matcher::Any)
        .with_body(json!({"current_page": 1, "last_page": 1, "data": [hoodie()]}).to_string())
        .create();

    cbg_against(&dir, &server)
        .args(["batch"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no templates found"));
}

// ---------------------------------------------------------------------------
// cbg templates
// ---------------------------------------------------------------------------

#[test]
fn templates_list_shows_only_templates() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products.json")
        .match_query(Matcher::Any)
        .with_body(
            json!({"current_page": 1, "last_page": 1, "data": [hoodie(), template()]}).to_string(),
        )
        .create();

    cbg_against(&dir, &server)
        .args(["templates", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pullover Hoodie"))
        .stdout(predicate::str::contains("Goose Hoodie").not());
}

#[test]
fn templates_promote_json_report() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/shops/77/products.json")
        .match_query(Matcher::Any)
        .with_body(
            json!({"current_page": 1, "last_page": 1, "data": [hoodie(), template()]}).to_string(),
        )
        .create();
    server
        .mock("GET", "/catalog/blueprints/77.json")
        .with_body(r#"{"id":77,"title":"Pullover Hoodie","description":"cozy"}"#)
        .create();
    server
        .mock("POST", "/shops/77/products.json")
        .with_body(created("t2", "[TEMPLATE]: Pullover Hoodie"))
        .create();

    let out = cbg_against(&dir, &server)
        .args(["--json", "templates", "promote", "--pause-ms", "0"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let outcomes = report["outcomes"].as_array().unwrap();
    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0]["status"], "created");
    assert_eq!(outcomes[1]["status"], "skipped");
}

// ---------------------------------------------------------------------------
// cbg update / generate
// ---------------------------------------------------------------------------

#[test]
fn update_without_fields_fails() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["update", "src"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to update"));
}

#[test]
fn update_sends_title() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let m = server
        .mock("PUT", "/shops/77/products/src.json")
        .match_body(Matcher::Json(json!({"title": "Renamed"})))
        .with_body(created("src", "Renamed"))
        .create();

    cbg_against(&dir, &server)
        .args(["update", "src", "--title", "Renamed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated src (Renamed)"));
    m.assert();
}

#[test]
fn generate_rejects_unknown_role() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["generate", "--theme", "Noir", "--role", "banner"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown role 'banner'"));
}

#[test]
fn generate_writes_into_graphics_root() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    server.mock("GET", "/sdapi/v1/options").with_body("{}").create();
    server
        .mock("POST", "/sdapi/v1/txt2img")
        .with_body(r#"{"images":["aGVsbG8="]}"#)
        .create();

    cbg(&dir)
        .env("SD_WEBUI_URL", server.url())
        .args(["generate", "--prompt", "seamless goose lattice"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(tiles)"));

    let tiles = dir.path().join("artifacts/graphics/tiles");
    let runs: Vec<_> = std::fs::read_dir(&tiles).unwrap().collect();
    assert_eq!(runs.len(), 1);
}

#[test]
fn generate_rejects_unknown_backend() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["generate", "--prompt", "goose", "--backend", "dalle"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown backend 'dalle'"));
}

#[test]
fn gemini_backend_without_key_fails() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["generate", "--prompt", "goose", "--backend", "gemini"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("GEMINI_API_KEY or GOOGLE_API_KEY"));
}

#[test]
fn generate_theme_with_gemini_writes_specimen() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let m = server
        .mock("POST", "/models/img-model:generateContent")
        .match_header("x-goog-api-key", "gk")
        .with_body(
            json!({"candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
            ]}}]})
            .to_string(),
        )
        .create();

    cbg(&dir)
        .env("GEMINI_API_BASE", server.url())
        .env("GEMINI_MODEL", "img-model")
        .env("GEMINI_API_KEY", "gk")
        .args(["generate", "--theme", "Noir", "--role", "texture", "--backend", "gemini"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(textures)"));

    let runs: Vec<_> = std::fs::read_dir(dir.path().join("artifacts/graphics/textures"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].join("specimen.png").exists());
    m.assert();
}

// ---------------------------------------------------------------------------
// cbg specimen
// ---------------------------------------------------------------------------

#[test]
fn specimen_generates_and_fabricates_from_template() {
    let dir = TempDir::new().unwrap();
    let mut server = mockito::Server::new();
    let page = json!({"current_page": 1, "last_page": 1, "data": [hoodie(), template()]});
    server
        .mock("GET", "/shops/77/products.json")
        .match_query(Matcher::Any)
        .with_body(page.to_string())
        .create();
    server
        .mock("GET", "/shops/77/products/tpl.json")
        .with_body(template().to_string())
        .create();
    let generation = server
        .mock("POST", "/models/img-model:generateContent")
        .with_body(
            json!({"candidates": [{"content": {"parts": [
                {"inlineData": {"mimeType": "image/png", "data": "aGVsbG8="}}
            ]}}]})
            .to_string(),
        )
        .expect(2)
        .create();
    let uploads = server
        .mock("POST", "/uploads/images.json")
        .with_body(r#"{"id":"fresh"}"#)
        .expect(2)
        .create();
    let create = server
        .mock("POST", "/shops/77/products.json")
        .with_body(created("new", "CBG Studio | Pullover Hoodie | Noir"))
        .expect(1)
        .create();

    cbg_against(&dir, &server)
        .env("GEMINI_API_BASE", server.url())
        .env("GEMINI_MODEL", "img-model")
        .env("GEMINI_API_KEY", "gk")
        .args(["specimen", "--theme", "Noir", "--template", "hoodie", "--backend", "gemini"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Template: [TEMPLATE]: Pullover Hoodie (tpl)"))
        .stdout(predicate::str::contains("Generated tile via gemini"))
        .stdout(predicate::str::contains("Created new"));

    assert!(dir.path().join("artifacts/graphics/tiles").is_dir());
    assert!(dir.path().join("artifacts/graphics/textures").is_dir());
    generation.assert();
    uploads.assert();
    create.assert();
}

#[test]
fn specimen_requires_printify_token_before_generating() {
    let dir = TempDir::new().unwrap();
    cbg(&dir)
        .args(["specimen", "--theme", "Noir"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PRINTIFY_API_TOKEN"));
    assert!(!dir.path().join("artifacts").exists());
}
