use crate::param::*;

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::Bytes;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error, warn};
use serde::Serialize;

use std::{
    ffi::OsStr,
    fs,
    io::{self, Write},
    path::Path,
};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    content_type: Option<String>,
    content_length: u64,
    date: DateTime<Utc>,
    content_encoding: Option<HttpEncoding>,
    server_name: String,
    allow: Option<Vec<HttpRequestMethod>>,
    content: Option<Bytes>,
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            content_type: None,
            content_length: 0,
            date: Utc::now(),
            content_encoding: None,
            server_name: SERVER_NAME.to_string(),
            allow: None,
            content: None,
        }
    }

    /// 只有状态码、没有响应体的响应。所有错误都以这种形式返回。
    pub fn empty(code: u16) -> Self {
        let mut response = Self::new();
        response.set_code(code);
        response
    }

    /// 405 响应，`Allow` 头列出该路径支持的方法
    pub fn method_not_allowed(allow: Vec<HttpRequestMethod>) -> Self {
        let mut response = Self::empty(405);
        response.allow = Some(allow);
        response
    }

    /// 序列化为 JSON 的响应体，按客户端支持的编码压缩
    pub fn json<T: Serialize>(
        code: u16,
        value: &T,
        accept_encoding: &[HttpEncoding],
        id: u128,
    ) -> Self {
        let body = match serde_json::to_vec(value) {
            Ok(b) => b,
            Err(e) => {
                error!("[ID{}]无法序列化JSON响应体：{}", id, e);
                return Self::empty(500);
            }
        };
        let mut response = Self::from_content(body, JSON_MIME, accept_encoding, id);
        response.set_code(code);
        response
    }

    /// 二进制响应体（照片），已压缩的格式不再压缩
    pub fn binary(content: Bytes, mime: &str) -> Self {
        let mut response = Self::new();
        response.content_length = content.len() as u64;
        response.content_type = Some(mime.to_string());
        response.content = Some(content);
        response
    }

    /// 读取静态文件作为响应体，文件不存在时返回 404
    pub fn from_file(path: &Path, accept_encoding: &[HttpEncoding], id: u128) -> Self {
        let contents = match fs::read(path) {
            Ok(c) => c,
            Err(e) => {
                warn!("[ID{}]无法读取静态文件{}：{}", id, path.display(), e);
                return Self::empty(404);
            }
        };
        let mime = get_mime(path.extension().unwrap_or_default());
        debug!("[ID{}]静态文件{}，MIME类型: {}", id, path.display(), mime);
        Self::from_content(contents, mime, accept_encoding, id)
    }

    fn from_content(
        contents: Vec<u8>,
        mime: &str,
        accept_encoding: &[HttpEncoding],
        id: u128,
    ) -> Self {
        let mut response = Self::new();
        response.content_encoding = if should_skip_compression(mime) {
            None
        } else {
            decide_encoding(accept_encoding)
        };
        match response.content_encoding {
            Some(HttpEncoding::Gzip) => debug!("[ID{}]使用Gzip压缩编码", id),
            Some(HttpEncoding::Br) => debug!("[ID{}]使用Brotli压缩编码", id),
            Some(HttpEncoding::Deflate) => debug!("[ID{}]使用Deflate压缩编码", id),
            None => debug!("[ID{}]不进行压缩", id),
        };
        let compressed = match compress(contents.clone(), response.content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("[ID{}]压缩响应体失败: {}，返回未压缩内容", id, e);
                response.content_encoding = None;
                contents
            }
        };
        response.content_length = compressed.len() as u64;
        response.content_type = Some(mime.to_string());
        response.content = Some(Bytes::from(compressed));
        response
    }

    fn set_code(&mut self, code: u16) -> &mut Self {
        self.status_code = code;
        self.information = match STATUS_CODES.get(&code) {
            Some(&info) => info.to_string(),
            None => {
                error!("非法的状态码：{}。这条错误说明代码编写出现了错误。", code);
                "Unknown".to_string()
            }
        };
        self
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let version: &str = match self.version {
            HttpVersion::V1_0 => "HTTP/1.0",
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let status_code: &str = &self.status_code.to_string();
        let information: &str = &self.information;
        let content_length: &str = &self.content_length.to_string();
        let date: &str = &format_date(&self.date);
        let server: &str = &self.server_name;

        let header = [
            version,
            " ",
            status_code,
            " ",
            information,
            CRLF,
            match &self.content_type {
                Some(t) => ["Content-Type: ", t.as_str(), CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            match self.content_encoding {
                Some(e) => ["Content-Encoding: ", e.to_string().as_str(), CRLF].concat(),
                None => "".to_string(),
            }
            .as_str(),
            "Content-Length: ",
            content_length,
            CRLF,
            "Date: ",
            date,
            CRLF,
            "Server: ",
            server,
            CRLF,
            match &self.allow {
                Some(a) => {
                    let allow_str = a
                        .iter()
                        .map(|method| method.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    ["Allow: ", allow_str.as_str(), CRLF].concat()
                }
                None => "".to_string(),
            }
            .as_str(),
            "Connection: close",
            CRLF,
            CRLF,
        ]
        .concat();
        [
            header.as_bytes(),
            match &self.content {
                Some(c) => c.as_ref(),
                None => &[],
            },
        ]
        .concat()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn content_encoding(&self) -> Option<HttpEncoding> {
        self.content_encoding
    }

    pub fn allow(&self) -> Option<&[HttpRequestMethod]> {
        self.allow.as_deref()
    }

    /// 响应体（已按 `Content-Encoding` 压缩）
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn get_content_length(&self) -> u64 {
        self.content_length
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    };

    if let (Ok(compressed), Some(_)) = (&result, mode) {
        debug!(
            "压缩完成: {:?}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/x-icon",
        "application/octet-stream",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

/// 优先级：gzip > deflate > br
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else if accept_encoding.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else {
        None
    }
}

fn get_mime(extension: &OsStr) -> &'static str {
    let extension = match extension.to_str() {
        Some(e) => e.to_lowercase(),
        None => {
            error!("无法将&OsStr转换为&str类型");
            return OCTET_STREAM;
        }
    };
    match MIME_TYPES.get(extension.as_str()) {
        Some(v) => *v,
        None => OCTET_STREAM,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn as_text(response: &Response) -> String {
        String::from_utf8_lossy(&response.as_bytes()).to_string()
    }

    #[test]
    fn test_format_date() {
        let formatted = format_date(&Utc::now());
        assert!(formatted.contains("+0000") || formatted.contains("GMT"));
    }

    #[test]
    fn test_compress_none() {
        let data = b"Hello, World!".to_vec();
        assert_eq!(compress(data.clone(), None).unwrap(), data);
    }

    #[test]
    fn test_compress_gzip_magic() {
        let data = b"Hello, World! This is a test string for compression.".to_vec();
        let result = compress(data.clone(), Some(HttpEncoding::Gzip)).unwrap();
        assert_eq!(&result[0..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_compress_large_data() {
        let data = vec![b'A'; 10000];
        for mode in [HttpEncoding::Gzip, HttpEncoding::Deflate, HttpEncoding::Br] {
            let result = compress(data.clone(), Some(mode)).unwrap();
            assert!(result.len() < data.len(), "{:?}", mode);
        }
    }

    #[test]
    fn test_decide_encoding_priority() {
        assert_eq!(
            decide_encoding(&[HttpEncoding::Br, HttpEncoding::Gzip]),
            Some(HttpEncoding::Gzip)
        );
        assert_eq!(
            decide_encoding(&[HttpEncoding::Br, HttpEncoding::Deflate]),
            Some(HttpEncoding::Deflate)
        );
        assert_eq!(decide_encoding(&[HttpEncoding::Br]), Some(HttpEncoding::Br));
        assert_eq!(decide_encoding(&[]), None);
    }

    #[test]
    fn test_get_mime() {
        assert_eq!(get_mime(OsStr::new("html")), "text/html;charset=utf-8");
        assert_eq!(get_mime(OsStr::new("HTML")), "text/html;charset=utf-8");
        assert_eq!(get_mime(OsStr::new("jpg")), "image/jpeg");
        assert_eq!(get_mime(OsStr::new("unknown_extension")), OCTET_STREAM);
    }

    #[test]
    fn test_empty_response_bytes() {
        let text = as_text(&Response::empty(404));

        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 0\r\n"));
        assert!(text.contains("Server: inventory-service\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(!text.contains("Content-Type"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_method_not_allowed_lists_methods() {
        let response =
            Response::method_not_allowed(vec![HttpRequestMethod::Get, HttpRequestMethod::Put]);
        let text = as_text(&response);
        assert!(text.starts_with("HTTP/1.1 405 Method Not Allowed"));
        assert!(text.contains("Allow: GET, PUT\r\n"));
        assert!(response.content().is_none());
    }

    #[test]
    fn test_json_response_uncompressed() {
        let response = Response::json(201, &serde_json::json!({"id": "a"}), &[], 0);
        assert_eq!(response.status_code(), 201);
        assert_eq!(response.information(), "Created");
        assert_eq!(response.content_type(), Some(JSON_MIME));
        assert_eq!(response.content().unwrap().as_ref(), br#"{"id":"a"}"#);
        assert_eq!(response.get_content_length(), 10);
    }

    #[test]
    fn test_json_response_gzip() {
        let response = Response::json(200, &vec!["x"; 50], &[HttpEncoding::Gzip], 0);
        assert_eq!(response.content_encoding(), Some(HttpEncoding::Gzip));
        assert!(as_text(&response).contains("Content-Encoding: gzip\r\n"));

        let mut decoded = String::new();
        GzDecoder::new(response.content().unwrap().as_ref())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with("[\"x\",\"x\""));
    }

    #[test]
    fn test_binary_response_is_never_compressed() {
        let photo = Bytes::from_static(&[0xFF, 0xD8, 0x00, 0xFF, 0xD9]);
        let response = Response::binary(photo.clone(), PHOTO_MIME);
        assert_eq!(response.content_encoding(), None);

        let bytes = response.as_bytes();
        assert!(bytes.ends_with(&photo));
        assert!(String::from_utf8_lossy(&bytes).contains("Content-Type: image/jpeg\r\n"));
    }

    #[test]
    fn test_from_file_missing_is_404() {
        let response = Response::from_file(Path::new("/nonexistent/RegisterForm.html"), &[], 0);
        assert_eq!(response.status_code(), 404);
    }

    #[test]
    fn test_from_file_html() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("SearchForm.html");
        fs::write(&path, "<html></html>").unwrap();

        let response = Response::from_file(&path, &[], 0);
        assert_eq!(response.status_code(), 200);
        assert_eq!(response.content_type(), Some("text/html;charset=utf-8"));
        assert_eq!(response.content().unwrap().as_ref(), b"<html></html>");
    }

    #[test]
    fn test_response_status_code_various() {
        for (code, expected_info) in [
            (200, "OK"),
            (201, "Created"),
            (204, "No Content"),
            (400, "Bad Request"),
            (404, "Not Found"),
            (405, "Method Not Allowed"),
            (500, "Internal Server Error"),
        ] {
            let response = Response::empty(code);
            assert_eq!(response.status_code(), code);
            assert_eq!(response.information(), expected_info);
        }
    }
}
