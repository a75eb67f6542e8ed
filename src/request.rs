// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求处理模块
//!
//! 负责将 TCP 流中读取的原始字节解析为强类型的 `Request` 结构体。它涵盖了：
//! 1. 头部与正文的切分：只有头部按 UTF-8 解析，正文以原始字节保留。
//! 2. 请求行（Request-Line）的解析（方法、路径、查询串、版本）。
//! 3. 路由与表单解码所需标头的提取（`Content-Type`、`Content-Length`、`User-Agent` 等）。
//! 4. 内容协商（Content Negotiation）相关的编码解析。

use bytes::Bytes;
use log::error;

use std::str;

use crate::{exception::Exception, param::*};

/// 表示一个完整的 HTTP 请求，包括已读满的请求体。
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP 请求方法
    method: HttpRequestMethod,
    /// 请求的资源路径（不含查询字符串）
    path: String,
    /// `?` 之后的查询字符串
    query: Option<String>,
    /// HTTP 协议版本
    version: HttpVersion,
    /// 客户端标识字符串
    user_agent: String,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    /// 请求体的媒体类型，原样保留参数部分（如 multipart 的 boundary）
    content_type: Option<String>,
    /// 原始请求体
    body: Bytes,
}

impl Request {
    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 定位头部结束标记 `\r\n\r\n`，只对其之前的部分做 UTF-8 校验。
    /// 2. 解析请求行：提取方法、路径和协议版本。
    /// 3. 迭代解析标头。
    /// 4. 按 `Content-Length` 截取请求体；缺失该标头时请求体为空。
    ///
    /// # 参数
    /// * `buffer` - 从网络 Socket 读取的原始数据（头部加上完整正文）。
    /// * `id` - 连接 ID，用于在日志中追踪请求。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let (head, rest) = match find_bytes(buffer, HEADER_END) {
            Some(pos) => (&buffer[..pos], &buffer[pos + HEADER_END.len()..]),
            None => (buffer, &buffer[buffer.len()..]),
        };

        // 1. 头部必须是合法的文本
        let head_string = match str::from_utf8(head) {
            Ok(s) => s,
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求头", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let request_lines: Vec<&str> = head_string.split(CRLF).collect();

        // 2. 解析请求行 (e.g., "PUT /inventory/abc HTTP/1.1")
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();

        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::MalformedRequest);
        }

        let method = match HttpRequestMethod::parse(first_line_parts[0]) {
            Some(m) => m,
            None => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, first_line_parts[0]);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            "HTTP/1.0" => HttpVersion::V1_0,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 路径中可能包含空格（虽然不规范），通过 join 尝试恢复
        let target = first_line_parts[1..first_line_parts.len() - 1].join(" ");
        let (path, query) = match target.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (target, None),
        };
        if !path.starts_with('/') && path != "*" {
            error!("[ID{}]请求目标不是绝对路径：{}", id, path);
            return Err(Exception::MalformedRequest);
        }

        // 3. 迭代各行解析 Headers
        let mut user_agent = "".to_string();
        let mut accept_encoding = vec![];
        let mut content_type = None;
        let mut content_length = None;
        for line in request_lines.iter().skip(1) {
            let (name, value) = match line.split_once(':') {
                Some((n, v)) => (n.trim().to_lowercase(), v.trim()),
                None => continue,
            };
            match name.as_str() {
                "user-agent" => user_agent = value.to_string(),
                "content-type" => content_type = Some(value.to_string()),
                "content-length" => match value.parse::<usize>() {
                    Ok(len) => content_length = Some(len),
                    Err(_) => {
                        error!("[ID{}]非法的Content-Length：{}", id, value);
                        return Err(Exception::MalformedRequest);
                    }
                },
                // 这里的逻辑比较简单，只要包含关键词即视为支持
                "accept-encoding" => {
                    if value.contains("gzip") {
                        accept_encoding.push(HttpEncoding::Gzip);
                    }
                    if value.contains("deflate") {
                        accept_encoding.push(HttpEncoding::Deflate);
                    }
                    if value.contains("br") {
                        accept_encoding.push(HttpEncoding::Br);
                    }
                }
                _ => {}
            }
        }

        // 4. 按声明的长度截取正文，多余的字节（管道化请求）被丢弃
        let body = match content_length {
            Some(len) if len > rest.len() => {
                error!("[ID{}]请求体不完整：声明{}字节，实际{}字节", id, len, rest.len());
                return Err(Exception::MalformedRequest);
            }
            Some(len) => Bytes::copy_from_slice(&rest[..len]),
            None => Bytes::new(),
        };

        Ok(Self {
            method,
            path,
            query,
            version,
            user_agent,
            accept_encoding,
            content_type,
            body,
        })
    }
}

// --- Getter 访问器实现 ---

impl Request {
    /// 获取 HTTP 协议版本
    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 获取请求路径（不含查询参数）
    pub fn path(&self) -> &str {
        &self.path
    }

    /// 获取查询字符串（不含 `?`），路由时不参与匹配
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// 获取请求方法
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    /// 获取用户代理字符串
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// 获取客户端支持的压缩算法列表
    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    /// 请求体的 `Content-Type`，缺失时为空串
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or("")
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// 在请求头中查找 `Content-Length`，供连接层判断还需读取多少字节。
///
/// `head` 为 `\r\n\r\n` 之前的部分。找不到或无法解析时返回 0。
pub fn declared_content_length(head: &[u8]) -> usize {
    let head = String::from_utf8_lossy(head);
    head.split(CRLF)
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// 在字节序列中查找子序列首次出现的位置。
pub fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
