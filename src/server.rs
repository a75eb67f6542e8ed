// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 连接处理
//!
//! 负责单个 TCP 流的生命周期：读取请求头，按 `Content-Length` 读完请求体，
//! 交给路由器分发，写回响应后关闭连接。
//!
//! 读取阶段是唯一的挂起点；请求体读完之后的处理全部同步完成。

use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    config::Config,
    exception::Exception,
    handler::{build_router, App},
    param::HEADER_END,
    request::{declared_content_length, find_bytes, Request},
    response::Response,
    router::Router,
};

const READ_CHUNK: usize = 4096;

/// 应用状态与分发表，在启动时构建一次，之后只读共享
pub struct Service {
    app: App,
    router: Router<App>,
}

impl Service {
    pub fn new(config: Config) -> Result<Self, Exception> {
        Ok(Self {
            app: App::new(config)?,
            router: build_router(),
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    /// 处理一份完整的请求报文（头部加正文），不涉及 Socket
    pub fn handle(&self, buffer: &[u8], id: u128) -> Response {
        let start_time = Instant::now();

        let request = match Request::try_from(buffer, id) {
            Ok(req) => req,
            Err(e) => {
                warn!("[ID{}]解析HTTP请求失败：{}，返回400", id, e);
                return Response::empty(400);
            }
        };
        debug!("[ID{}]成功解析HTTP请求", id);
        if let Some(query) = request.query() {
            debug!("[ID{}]忽略查询字符串：{}", id, query);
        }

        let response = self.router.dispatch(&self.app, &request, id);
        debug!(
            "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
            id,
            start_time.elapsed().as_millis()
        );

        info!(
            "[ID{}] {}, {}, {}, {}, {}, {}, ",
            id,
            request.version(),
            request.path(),
            request.method(),
            response.status_code(),
            response.information(),
            request.user_agent(),
        );
        response
    }
}

/// 读取一个完整请求：先读到 `\r\n\r\n`，再读够 `Content-Length` 声明的字节数。
///
/// 对端提前关闭时返回已读到的部分，由解析阶段判定是否合法。
pub async fn read_request<R>(reader: &mut R, id: u128) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let head_end = loop {
        if let Some(pos) = find_bytes(&buffer, HEADER_END) {
            break pos;
        }
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            debug!("[ID{}]请求头未结束时连接已关闭", id);
            return Ok(buffer);
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let declared = declared_content_length(&buffer[..head_end]);
    let expected = match (head_end + HEADER_END.len()).checked_add(declared) {
        Some(total) => total,
        None => {
            // 交给解析阶段按请求体不完整返回 400
            warn!("[ID{}]Content-Length过大：{}，停止读取", id, declared);
            return Ok(buffer);
        }
    };
    while buffer.len() < expected {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            warn!(
                "[ID{}]请求体未读完时连接已关闭：期望{}字节，实际{}字节",
                id,
                expected,
                buffer.len()
            );
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    debug!("[ID{}]HTTP请求接收完毕，共{}字节", id, buffer.len());
    Ok(buffer)
}

/// # 连接处理器
///
/// 一个连接只处理一个请求，响应带 `Connection: close`。
pub async fn handle_connection<S>(stream: &mut S, id: u128, service: &Service)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let buffer = match read_request(stream, id).await {
        Ok(b) if b.is_empty() => return,
        Ok(b) => b,
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };

    let response = service.handle(&buffer, id);
    let response_bytes = response.as_bytes();
    debug!("[ID{}]发送全量响应，长度: {}", id, response_bytes.len());
    if let Err(e) = stream.write_all(&response_bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    let _ = stream.flush().await;
}
