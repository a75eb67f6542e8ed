// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了库存服务在请求处理生命周期中可能抛出的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：涵盖了协议解析错误、业务校验错误以及持久化层的写入错误。
//! - **语义映射**：每个变体都通过 [`Exception::status_code`] 对应一个 HTTP 状态码，
//!   上层只需把异常翻译为空响应体的状态码即可。
//! - 表单解码失败不在此列：解码器总是返回（可能为空的）字段表。

use std::fmt;

/// 服务器处理请求过程中发生的异常类型。
///
/// 该枚举通常作为 `Result` 的 `Err` 部分返回，用于指示处理失败的具体原因。
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Exception {
    /// 请求头部分无法解析为合法的 UTF-8 字符串。
    /// 请求体不做此检查，二进制负载原样保留。
    RequestIsNotUtf8,
    /// 请求行或头部格式不符合 HTTP/1.1 报文结构。
    MalformedRequest,
    /// 客户端使用了服务器无法识别的 HTTP 方法。
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本（例如：HTTP/0.9 或 HTTP/2.0）。
    UnsupportedHttpVersion,
    /// 必填字段缺失或为空白，对应 `400 Bad Request`。
    ValidationFailed,
    /// 请求体的媒体类型与端点要求不符（例如 `/search` 需要 URL 编码表单）。
    UnsupportedMediaType,
    /// 指定 id 的物品记录不存在（或记录文件无法读取）。对应 `404 Not Found`。
    ItemNotFound,
    /// 物品存在但没有照片。同样对应 `404 Not Found`。
    PhotoNotFound,
    /// 路径存在但请求方法不被允许。对应 `405 Method Not Allowed`。
    MethodNotAllowed,
    /// 写入记录或照片文件失败，对应 `500 Internal Server Error`。
    StorageFailed,
}

use Exception::*;

impl Exception {
    /// 异常对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            RequestIsNotUtf8
            | MalformedRequest
            | UnSupportedRequestMethod
            | UnsupportedHttpVersion
            | ValidationFailed
            | UnsupportedMediaType => 400,
            ItemNotFound | PhotoNotFound => 404,
            MethodNotAllowed => 405,
            StorageFailed => 500,
        }
    }
}

/// 为 `Exception` 实现 `Display` 特性，使其支持字符串格式化输出。
///
/// 这些描述信息只用于日志，不会出现在响应体中。
impl fmt::Display for Exception {
    /// 根据错误类型写入人类可读的描述文本。
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestIsNotUtf8 => write!(f, "Request head can't be parsed in UTF-8"),
            MalformedRequest => write!(f, "Malformed HTTP request"),
            UnSupportedRequestMethod => write!(f, "Unsupported request method"),
            UnsupportedHttpVersion => write!(f, "Unsupported HTTP version"),
            ValidationFailed => write!(f, "Required field is missing or blank (400)"),
            UnsupportedMediaType => write!(f, "Unsupported request body media type (400)"),
            ItemNotFound => write!(f, "Item not found (404)"),
            PhotoNotFound => write!(f, "Photo not found (404)"),
            MethodNotAllowed => write!(f, "Method not allowed (405)"),
            StorageFailed => write!(f, "Couldn't write to item storage (500)"),
        }
    }
}

impl std::error::Error for Exception {}
