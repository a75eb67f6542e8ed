// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路由引擎
//!
//! 以 (方法, 路径模式) 为键的分发表。路由器在启动时通过 [`RouterBuilder`]
//! 一次性构建完成，之后不再修改。
//!
//! ## 路由规则：
//! 1. 路径模式由字面片段和至多一个动态片段 `{name}` 组成，例如 `/inventory/{id}/photo`。
//! 2. 路径匹配但方法未注册时返回 405（包括 HEAD 与 OPTIONS），并在 `Allow` 中列出注册过的方法。
//! 3. 所有模式都不匹配时交给兜底处理函数。

use log::debug;

use crate::{
    exception::Exception, param::HttpRequestMethod, request::Request, response::Response,
};

/// 处理函数：共享状态、请求、路径参数、连接 ID
pub type Handler<S> = fn(&S, &Request, &PathParams, u128) -> Response;

/// 从路径中提取出的动态片段
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathParams {
    value: Option<String>,
}

impl PathParams {
    /// 动态片段的值；模式中没有动态片段时为空串
    pub fn id(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Param,
}

/// 路径模式，例如 `/inventory/{id}`
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = pattern
            .trim_start_matches('/')
            .split('/')
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// 匹配成功时返回提取到的路径参数。动态片段不能为空。
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = PathParams::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param if part.is_empty() => return None,
                Segment::Param => params.value = Some(part.to_string()),
            }
        }
        Some(params)
    }
}

struct Route<S> {
    pattern: PathPattern,
    handlers: Vec<(HttpRequestMethod, Handler<S>)>,
}

impl<S> Route<S> {
    fn handler_for(&self, method: HttpRequestMethod) -> Option<Handler<S>> {
        self.handlers
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, h)| *h)
    }

    /// 该路径注册过的方法，按注册顺序
    fn allowed(&self) -> Vec<HttpRequestMethod> {
        self.handlers.iter().map(|(m, _)| *m).collect()
    }
}

/// 构建完成后不可变的路由器
pub struct Router<S> {
    routes: Vec<Route<S>>,
    fallback: Handler<S>,
}

pub struct RouterBuilder<S> {
    routes: Vec<Route<S>>,
}

impl<S> RouterBuilder<S> {
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// 注册一条路由。同一模式多次注册时合并到同一条目。
    pub fn route(mut self, method: HttpRequestMethod, pattern: &str, handler: Handler<S>) -> Self {
        let pattern = PathPattern::parse(pattern);
        match self.routes.iter_mut().find(|r| r.pattern == pattern) {
            Some(route) => route.handlers.push((method, handler)),
            None => self.routes.push(Route {
                pattern,
                handlers: vec![(method, handler)],
            }),
        }
        self
    }

    /// 以兜底处理函数结束构建
    pub fn build(self, fallback: Handler<S>) -> Router<S> {
        Router {
            routes: self.routes,
            fallback,
        }
    }
}

impl<S> Default for RouterBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Router<S> {
    pub fn builder() -> RouterBuilder<S> {
        RouterBuilder::new()
    }

    pub fn dispatch(&self, state: &S, request: &Request, id: u128) -> Response {
        let path = request.path();
        debug!("[ID{}]路由匹配开始: {} {}", id, request.method(), path);

        let matched = self
            .routes
            .iter()
            .find_map(|route| route.pattern.matches(path).map(|params| (route, params)));
        let (route, params) = match matched {
            Some(m) => m,
            None => {
                debug!("[ID{}]没有匹配的路由，交给兜底处理", id);
                return (self.fallback)(state, request, &PathParams::default(), id);
            }
        };

        let method = request.method();
        match route.handler_for(method) {
            Some(handler) => handler(state, request, &params, id),
            None => {
                debug!("[ID{}]{}：{} {}", id, Exception::MethodNotAllowed, method, path);
                Response::method_not_allowed(route.allowed())
            }
        }
    }
}
