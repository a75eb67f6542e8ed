// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 端点处理函数
//!
//! 每个函数处理分发表中的一个 (方法, 路径) 组合：解码请求体、调用物品仓库、
//! 把结果翻译为状态码。所有失败都以空响应体返回，只靠状态码表达。

use log::{debug, error, warn};
use serde_json::Value;

use crate::{
    config::Config,
    exception::Exception,
    form::{parse_multipart, parse_urlencoded},
    param::{HttpRequestMethod, PHOTO_MIME, REGISTER_FORM, SEARCH_FORM},
    request::Request,
    response::Response,
    router::{PathParams, Router},
    store::{ItemPatch, ItemStore},
};

const MULTIPART: &str = "multipart/form-data";
const URLENCODED: &str = "application/x-www-form-urlencoded";

/// 处理函数共享的应用状态
pub struct App {
    config: Config,
    store: ItemStore,
}

impl App {
    /// 打开配置中的物品目录（不存在时递归创建）
    pub fn new(config: Config) -> Result<Self, Exception> {
        let store = ItemStore::open(&config.items_dir(), config.photo_cache_size())?;
        Ok(Self { config, store })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    fn base_url(&self) -> String {
        self.config.base_url()
    }
}

/// 构建完整的分发表
pub fn build_router() -> Router<App> {
    use HttpRequestMethod::*;

    Router::builder()
        .route(Get, "/RegisterForm.html", register_form)
        .route(Get, "/SearchForm.html", search_form)
        .route(Post, "/register", register)
        .route(Get, "/inventory", list_items)
        .route(Get, "/inventory/{id}", get_item)
        .route(Put, "/inventory/{id}", update_item)
        .route(Delete, "/inventory/{id}", delete_item)
        .route(Get, "/inventory/{id}/photo", get_photo)
        .route(Put, "/inventory/{id}/photo", put_photo)
        .route(Post, "/search", search)
        .build(not_found)
}

fn failure(e: Exception, id: u128) -> Response {
    match e {
        Exception::StorageFailed => error!("[ID{}]{}", id, e),
        _ => debug!("[ID{}]{}", id, e),
    }
    Response::empty(e.status_code())
}

fn register_form(app: &App, request: &Request, _: &PathParams, id: u128) -> Response {
    let path = app.config.static_root().join(REGISTER_FORM);
    Response::from_file(&path, request.accept_encoding(), id)
}

fn search_form(app: &App, request: &Request, _: &PathParams, id: u128) -> Response {
    let path = app.config.static_root().join(SEARCH_FORM);
    Response::from_file(&path, request.accept_encoding(), id)
}

/// POST /register：multipart 表单，`inventory_name` 必填
fn register(app: &App, request: &Request, _: &PathParams, id: u128) -> Response {
    let form = parse_multipart(request.body(), request.content_type());
    debug!("[ID{}]注册表单包含{}个字段", id, form.len());

    let name = form.text("inventory_name").unwrap_or("");
    let description = form.text("description").unwrap_or("");
    // 以文本形式出现的 photo 字段不算照片
    let photo = form.file("photo").map(|f| f.content.as_ref());

    match app.store.create(name, description, photo) {
        Ok(item) => Response::json(
            201,
            &item.view(&app.base_url()),
            request.accept_encoding(),
            id,
        ),
        Err(e) => failure(e, id),
    }
}

fn list_items(app: &App, request: &Request, _: &PathParams, id: u128) -> Response {
    let base_url = app.base_url();
    let views: Vec<_> = app
        .store
        .list()
        .iter()
        .map(|item| item.view(&base_url))
        .collect();
    debug!("[ID{}]列出{}个物品", id, views.len());
    Response::json(200, &views, request.accept_encoding(), id)
}

fn get_item(app: &App, request: &Request, params: &PathParams, id: u128) -> Response {
    match app.store.get(params.id()) {
        Ok(item) => Response::json(200, &item.view(&app.base_url()), request.accept_encoding(), id),
        Err(e) => failure(e, id),
    }
}

/// PUT /inventory/{id}：JSON 部分更新。无法解析的请求体按 `{}` 处理。
fn update_item(app: &App, request: &Request, params: &PathParams, id: u128) -> Response {
    if !app.store.exists(params.id()) {
        return failure(Exception::ItemNotFound, id);
    }
    let patch = parse_patch(request.body(), id);
    match app.store.update(params.id(), patch) {
        Ok(item) => Response::json(200, &item.view(&app.base_url()), request.accept_encoding(), id),
        Err(e) => failure(e, id),
    }
}

/// 只接受字符串类型的 `name` 与 `description`
fn parse_patch(body: &[u8], id: u128) -> ItemPatch {
    let value: Value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(body).unwrap_or_else(|e| {
            warn!("[ID{}]更新请求体不是合法的JSON（{}），按空对象处理", id, e);
            Value::Null
        })
    };
    let field = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
    ItemPatch {
        name: field("name"),
        description: field("description"),
    }
}

fn delete_item(app: &App, _: &Request, params: &PathParams, id: u128) -> Response {
    match app.store.delete(params.id()) {
        Ok(true) => Response::empty(200),
        Ok(false) => failure(Exception::ItemNotFound, id),
        Err(e) => failure(e, id),
    }
}

fn get_photo(app: &App, _: &Request, params: &PathParams, id: u128) -> Response {
    match app.store.get_photo(params.id()) {
        Ok(bytes) => Response::binary(bytes, PHOTO_MIME),
        Err(e) => failure(e, id),
    }
}

/// PUT /inventory/{id}/photo：multipart 时必须带 `photo` 文件字段，否则整个请求体就是照片
fn put_photo(app: &App, request: &Request, params: &PathParams, id: u128) -> Response {
    if !app.store.exists(params.id()) {
        return failure(Exception::ItemNotFound, id);
    }
    let result = if request.content_type().starts_with(MULTIPART) {
        let form = parse_multipart(request.body(), request.content_type());
        match form.file("photo") {
            Some(part) => app.store.set_photo(params.id(), &part.content),
            None => Err(Exception::ValidationFailed),
        }
    } else {
        app.store.set_photo(params.id(), request.body())
    };
    match result {
        Ok(()) => Response::empty(200),
        Err(e) => failure(e, id),
    }
}

/// POST /search：URL 编码表单 `id` 与可选的 `has_photo`
fn search(app: &App, request: &Request, _: &PathParams, id: u128) -> Response {
    if !request.content_type().contains(URLENCODED) {
        return failure(Exception::UnsupportedMediaType, id);
    }
    let form = parse_urlencoded(request.body());
    let item_id = form.get("id").map(|s| s.trim()).unwrap_or("");
    if item_id.is_empty() {
        return failure(Exception::ItemNotFound, id);
    }
    let item = match app.store.get(item_id) {
        Ok(item) => item,
        Err(e) => return failure(e, id),
    };

    let mut view = item.view(&app.base_url());
    if is_truthy(form.get("has_photo").map(String::as_str)) {
        view.description = format!("{} {}", view.description, view.photo)
            .trim()
            .to_string();
    }
    Response::json(200, &view, request.accept_encoding(), id)
}

/// 缺失、空串、`false`、`0` 以外的值都为真
fn is_truthy(flag: Option<&str>) -> bool {
    !matches!(flag, None | Some("") | Some("false") | Some("0"))
}

/// 未匹配任何路由
fn not_found(_: &App, request: &Request, _: &PathParams, id: u128) -> Response {
    debug!("[ID{}]路径{}不存在，返回404", id, request.path());
    Response::empty(404)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ItemView;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        app: App,
        router: Router<App>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let config = Config::with_dirs(&dir.path().join("cache"), &dir.path().join("static"));
            let app = App::new(config).unwrap();
            Self {
                _dir: dir,
                app,
                router: build_router(),
            }
        }

        fn send(&self, raw: &[u8]) -> Response {
            let request = Request::try_from(raw, 0).unwrap();
            self.router.dispatch(&self.app, &request, 0)
        }
    }

    fn with_body(head: &str, body: &[u8]) -> Vec<u8> {
        let mut raw = format!("{}Content-Length: {}\r\n\r\n", head, body.len()).into_bytes();
        raw.extend_from_slice(body);
        raw
    }

    fn item_of(response: &Response) -> ItemView {
        serde_json::from_slice(response.content().unwrap()).unwrap()
    }

    fn register_body(name: &str, description: &str) -> Vec<u8> {
        format!(
            "--XyZ\r\nContent-Disposition: form-data; name=\"inventory_name\"\r\n\r\n{}\r\n\
             --XyZ\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\n{}\r\n--XyZ--\r\n",
            name, description
        )
        .into_bytes()
    }

    fn register(fixture: &Fixture, name: &str, description: &str) -> Response {
        fixture.send(&with_body(
            "POST /register HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\n",
            &register_body(name, description),
        ))
    }

    #[test]
    fn test_register_and_get() {
        let fixture = Fixture::new();
        let response = register(&fixture, "Widget", "Blue");
        assert_eq!(response.status_code(), 201);
        let created = item_of(&response);
        assert_eq!(created.name, "Widget");
        assert_eq!(
            created.photo,
            format!("http://127.0.0.1:7878/inventory/{}/photo", created.id)
        );

        let raw = format!("GET /inventory/{} HTTP/1.1\r\n\r\n", created.id);
        let fetched = item_of(&fixture.send(raw.as_bytes()));
        assert_eq!(fetched, created);
    }

    #[test]
    fn test_register_blank_name_is_400() {
        let fixture = Fixture::new();
        assert_eq!(register(&fixture, "   ", "Blue").status_code(), 400);

        let response = fixture.send(&with_body(
            "POST /register HTTP/1.1\r\nContent-Type: text/plain\r\n",
            b"inventory_name=Widget",
        ));
        assert_eq!(response.status_code(), 400);
        assert!(fixture.app.store().list().is_empty());
    }

    #[test]
    fn test_update_ignores_bad_json_and_non_strings() {
        let fixture = Fixture::new();
        let created = item_of(&register(&fixture, "Widget", "Blue"));
        let head = format!("PUT /inventory/{} HTTP/1.1\r\n", created.id);

        let response = fixture.send(&with_body(&head, b"{not json"));
        assert_eq!(response.status_code(), 200);
        assert_eq!(item_of(&response).description, "Blue");

        let response = fixture.send(&with_body(&head, br#"{"name":42,"description":"Red"}"#));
        let updated = item_of(&response);
        assert_eq!(updated.name, "Widget");
        assert_eq!(updated.description, "Red");
    }

    #[test]
    fn test_update_missing_is_404() {
        let fixture = Fixture::new();
        let response = fixture.send(&with_body("PUT /inventory/ghost HTTP/1.1\r\n", b"{}"));
        assert_eq!(response.status_code(), 404);
        assert!(response.content().is_none());
    }

    #[test]
    fn test_put_photo_multipart_without_photo_part_is_400() {
        let fixture = Fixture::new();
        let created = item_of(&register(&fixture, "Widget", ""));
        let head = format!(
            "PUT /inventory/{}/photo HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\n",
            created.id
        );
        let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"photo\"\r\n\r\nnot a file\r\n--XyZ--\r\n";
        assert_eq!(fixture.send(&with_body(&head, body)).status_code(), 400);
    }

    #[test]
    fn test_put_photo_raw_body() {
        let fixture = Fixture::new();
        let created = item_of(&register(&fixture, "Widget", ""));
        let head = format!(
            "PUT /inventory/{}/photo HTTP/1.1\r\nContent-Type: image/jpeg\r\n",
            created.id
        );
        let photo = [0xFF, 0xD8, 0x00, 0x80, 0xFF, 0xD9];
        assert_eq!(fixture.send(&with_body(&head, &photo)).status_code(), 200);

        let raw = format!("GET /inventory/{}/photo HTTP/1.1\r\n\r\n", created.id);
        let response = fixture.send(raw.as_bytes());
        assert_eq!(response.content_type(), Some(PHOTO_MIME));
        assert_eq!(response.content().unwrap().as_ref(), &photo);
    }

    #[test]
    fn test_search_requires_form_content_type() {
        let fixture = Fixture::new();
        let created = item_of(&register(&fixture, "Widget", "Blue"));
        let body = format!("id={}", created.id);
        let response = fixture.send(&with_body(
            "POST /search HTTP/1.1\r\nContent-Type: application/json\r\n",
            body.as_bytes(),
        ));
        assert_eq!(response.status_code(), 400);
    }

    #[test]
    fn test_search_trims_id_and_appends_photo() {
        let fixture = Fixture::new();
        let created = item_of(&register(&fixture, "Widget", ""));
        let body = format!("id=+{}+&has_photo=on", created.id);
        let response = fixture.send(&with_body(
            "POST /search HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n",
            body.as_bytes(),
        ));
        assert_eq!(response.status_code(), 200);
        // 描述为空时只剩 URL
        assert_eq!(item_of(&response).description, created.photo);
    }

    #[test]
    fn test_search_empty_id_is_404() {
        let fixture = Fixture::new();
        let response = fixture.send(&with_body(
            "POST /search HTTP/1.1\r\nContent-Type: application/x-www-form-urlencoded\r\n",
            b"id=%20&has_photo=1",
        ));
        assert_eq!(response.status_code(), 404);
    }

    #[test]
    fn test_truthy_flags() {
        assert!(is_truthy(Some("yes")));
        assert!(is_truthy(Some("true")));
        assert!(is_truthy(Some("1")));
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some("")));
        assert!(!is_truthy(Some("false")));
        assert!(!is_truthy(Some("0")));
    }

    #[test]
    fn test_static_form_pages() {
        let fixture = Fixture::new();
        assert_eq!(
            fixture.send(b"GET /RegisterForm.html HTTP/1.1\r\n\r\n").status_code(),
            404
        );

        let static_root = fixture.app.config().static_root().to_path_buf();
        std::fs::create_dir_all(&static_root).unwrap();
        std::fs::write(static_root.join(SEARCH_FORM), "<form></form>").unwrap();
        let response = fixture.send(b"GET /SearchForm.html HTTP/1.1\r\n\r\n");
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content().unwrap().as_ref(), b"<form></form>");

        let response = fixture.send(b"POST /SearchForm.html HTTP/1.1\r\n\r\n");
        assert_eq!(response.status_code(), 405);
    }

    #[test]
    fn test_unknown_path_is_empty_404() {
        let fixture = Fixture::new();
        let response = fixture.send(b"GET /favicon.ico HTTP/1.1\r\n\r\n");
        assert_eq!(response.status_code(), 404);
        assert!(response.content().is_none());
    }
}
