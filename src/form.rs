// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求体表单解码模块
//!
//! 把原始请求体解析为「字段名 → 字段值」的映射，支持两种编码：
//! - `application/x-www-form-urlencoded`：结果只包含文本值。
//! - `multipart/form-data`：文本字段或带文件名、媒体类型的二进制文件字段。
//!
//! 所有切分都直接在字节切片上完成，文件内容不经过任何文本编码转换。
//! 解码是宽容的：无法解析的单个分段被跳过，缺少 boundary 时返回空结果，
//! 调用方据此产生 400/404，而不是由解码器报错。

use std::collections::HashMap;

use bytes::Bytes;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::param::{CRLF, HEADER_END, OCTET_STREAM};
use crate::request::find_bytes;

lazy_static! {
    static ref BOUNDARY_RE: Regex = Regex::new(r"(?i)boundary=([^;]+)").unwrap();
    // 前面必须是分隔符，避免把 filename="..." 误认为 name="..."
    static ref NAME_RE: Regex = Regex::new(r#"(?i)(?:^|[;\s])name="([^"]+)""#).unwrap();
    static ref FILENAME_RE: Regex = Regex::new(r#"(?i)filename="([^"]*)""#).unwrap();
    static ref CONTENT_TYPE_RE: Regex = Regex::new(r"(?i)Content-Type:[ \t]*([^\r\n]+)").unwrap();
}

/// multipart 中的文件字段
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub filename: String,
    pub content_type: String,
    pub content: Bytes,
}

/// 表单字段的值
#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File(FilePart),
}

/// multipart 解码结果。同名字段后出现的覆盖先出现的。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormData {
    fields: HashMap<String, FormValue>,
}

impl FormData {
    /// 取文本字段；字段不存在或是文件时返回 `None`
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FormValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    /// 取文件字段；字段不存在或是文本时返回 `None`
    pub fn file(&self, name: &str) -> Option<&FilePart> {
        match self.fields.get(name) {
            Some(FormValue::File(f)) => Some(f),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// 解析 URL 编码的表单。
///
/// 以 `&` 切分键值对，键和值分别做百分号解码；没有 `=` 的键值为空串，
/// 值在第二个 `=` 处截断，同名键以最后一次出现为准，空的键值对被忽略。
pub fn parse_urlencoded(body: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(body);
    let mut out = HashMap::new();
    for pair in text.split('&') {
        if pair.is_empty() {
            continue;
        }
        let mut halves = pair.split('=');
        let key = halves.next().unwrap_or("");
        let value = halves.next().unwrap_or("");
        out.insert(percent_decode(key), percent_decode(value));
    }
    out
}

/// 百分号解码，`+` 视为空格。
///
/// 非法的转义序列（如 `%zz` 或末尾不完整的 `%4`）按字面保留，
/// 解码后不是合法 UTF-8 的字节以替换字符表示。
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => match (
                bytes.get(i + 1).and_then(hex_value),
                bytes.get(i + 2).and_then(hex_value),
            ) {
                (Some(hi), Some(lo)) => {
                    decoded.push(hi << 4 | lo);
                    i += 3;
                    continue;
                }
                _ => decoded.push(b'%'),
            },
            b'+' => decoded.push(b' '),
            b => decoded.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn hex_value(byte: &u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// 从 `Content-Type` 中提取 multipart 的 boundary 参数（去掉可选的引号）。
pub fn boundary_of(content_type: &str) -> Option<String> {
    let captures = BOUNDARY_RE.captures(content_type)?;
    let boundary = captures[1].trim().trim_matches('"');
    if boundary.is_empty() {
        None
    } else {
        Some(boundary.to_string())
    }
}

/// 解析 multipart/form-data 请求体。
///
/// 1. 以 `--<boundary>` 切分，丢弃第一个分隔符之前和最后一个分隔符之后的部分。
/// 2. 每个分段以第一个空行划分头部与内容，内容末尾紧邻下一个分隔符的 CRLF 被去掉。
/// 3. 没有 `name` 属性或找不到空行的分段被跳过。
/// 4. 带非空 `filename` 的分段是文件字段，其余为文本字段。
pub fn parse_multipart(body: &[u8], content_type: &str) -> FormData {
    let mut form = FormData::default();
    let boundary = match boundary_of(content_type) {
        Some(b) => b,
        None => {
            debug!("Content-Type中没有boundary参数：{}", content_type);
            return form;
        }
    };
    let delimiter = format!("--{}", boundary).into_bytes();

    let segments = split_bytes(body, &delimiter);
    if segments.len() < 3 {
        return form;
    }
    for segment in &segments[1..segments.len() - 1] {
        if let Some((name, value)) = parse_part(segment) {
            form.fields.insert(name, value);
        }
    }
    form
}

fn parse_part(segment: &[u8]) -> Option<(String, FormValue)> {
    let split_at = find_bytes(segment, HEADER_END)?;
    let head = String::from_utf8_lossy(&segment[..split_at]);
    let mut content = &segment[split_at + HEADER_END.len()..];
    if content.ends_with(CRLF.as_bytes()) {
        content = &content[..content.len() - CRLF.len()];
    }

    let name = NAME_RE.captures(&head)?[1].to_string();
    let filename = FILENAME_RE
        .captures(&head)
        .map(|c| c[1].to_string())
        .filter(|f| !f.is_empty());

    let value = match filename {
        Some(filename) => {
            let content_type = CONTENT_TYPE_RE
                .captures(&head)
                .map(|c| c[1].trim().to_string())
                .unwrap_or_else(|| OCTET_STREAM.to_string());
            FormValue::File(FilePart {
                filename,
                content_type,
                content: Bytes::copy_from_slice(content),
            })
        }
        None => FormValue::Text(String::from_utf8_lossy(content).into_owned()),
    };
    Some((name, value))
}

/// 按分隔符切分字节序列，行为与 `str::split` 一致（保留空段）。
fn split_bytes<'a>(haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut segments = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find_bytes(rest, delimiter) {
        segments.push(&rest[..pos]);
        rest = &rest[pos + delimiter.len()..];
    }
    segments.push(rest);
    segments
}
