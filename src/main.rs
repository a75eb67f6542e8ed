// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 库存服务
//!
//! 基于 Tokio 运行时的物品目录 HTTP 服务。
//! 核心功能包括：
//! - 物品的注册、查询、更新、删除与照片管理
//! - URL 编码与 multipart 表单解码
//! - 默认单线程事件循环，可配置为多线程
//! - 后台管理控制台（CLI 指令交互）

use inventory_service::{
    config::{CliArgs, Config},
    server::{handle_connection, Service},
};

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use log4rs::{
    append::console::ConsoleAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    runtime::{Builder, Runtime},
    sync::Notify,
};

use std::{
    process,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

const LOG_CONFIG_PATH: &str = "config/log4rs.yaml";

/// # 程序入口点
///
/// 初始化日志、加载配置、构建运行时并启动主事件循环。
fn main() {
    // 1. 日志系统：优先使用外部 YAML 配置，失败时退回控制台输出
    init_logging();

    // 2. 配置加载：TOML 文件打底，命令行参数覆盖
    let args = CliArgs::parse();
    let config = Config::from_toml(&args.config).with_overrides(&args);
    info!("配置文件{}已载入", args.config);
    info!("数据目录: {}", config.cache_dir().display());

    // 3. 运行时：默认单线程事件循环
    let runtime = match build_runtime(config.worker_threads()) {
        Ok(rt) => rt,
        Err(e) => {
            error!("无法构建Tokio运行时：{}", e);
            process::exit(1);
        }
    };

    // 4. 应用状态：打开物品目录并构建分发表
    let service = match Service::new(config.clone()) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("无法初始化物品存储：{}", e);
            process::exit(1);
        }
    };

    runtime.block_on(serve(config, service));

    // 控制台可能仍阻塞在标准输入上，不无限等待
    runtime.shutdown_timeout(Duration::from_secs(1));
    info!("服务器已关闭");
}

fn init_logging() {
    let err = match log4rs::init_file(LOG_CONFIG_PATH, Default::default()) {
        Ok(()) => return,
        Err(e) => e,
    };
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {h({l})} {m}{n}",
        )))
        .build();
    let config = log4rs::config::Config::builder()
        .appender(Appender::builder().build("stdout", Box::new(stdout)))
        .build(Root::builder().appender("stdout").build(LevelFilter::Info));
    match config.map(log4rs::init_config) {
        Ok(Ok(_)) => warn!("无法加载日志配置{}：{}，改用控制台日志", LOG_CONFIG_PATH, err),
        Ok(Err(e)) => eprintln!("无法初始化日志系统：{}", e),
        Err(e) => eprintln!("无法构建日志配置：{}", e),
    }
}

fn build_runtime(worker_threads: usize) -> std::io::Result<Runtime> {
    if worker_threads <= 1 {
        info!("使用单线程事件循环");
        Builder::new_current_thread().enable_all().build()
    } else {
        info!("使用{}个工作线程", worker_threads);
        Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .enable_all()
            .build()
    }
}

async fn serve(config: Config, service: Arc<Service>) {
    // 5. 网络层初始化
    let address = format!("{}:{}", config.host(), config.port());
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定地址：{}，错误：{}", address, e);
            return;
        }
    };
    info!("服务端正在监听 {}", config.base_url());

    // 6. 生命周期管理
    // shutdown: 控制台发出的停机信号
    // active_connection: 当前并发连接数
    let shutdown = Arc::new(Notify::new());
    let active_connection = Arc::new(AtomicUsize::new(0));

    tokio::spawn(console(
        Arc::clone(&shutdown),
        Arc::clone(&active_connection),
        Arc::clone(&service),
    ));

    let mut id: u128 = 0;

    // 7. 主事件循环
    loop {
        let (mut stream, addr) = tokio::select! {
            _ = shutdown.notified() => {
                info!("主循环接收到停机指令，正在退出...");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    error!("接受连接失败：{}", e);
                    continue;
                }
            },
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        let active_connection = Arc::clone(&active_connection);
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            active_connection.fetch_add(1, Ordering::SeqCst);
            handle_connection(&mut stream, id, &service).await;
            active_connection.fetch_sub(1, Ordering::SeqCst);
        });
        id += 1;
    }
}

/// 交互式管理控制台，标准输入关闭时退出但不停机
async fn console(shutdown: Arc<Notify>, active_connection: Arc<AtomicUsize>, service: Arc<Service>) {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) => {
                debug!("标准输入已关闭，控制台退出");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("读取控制台输入失败：{}", e);
                break;
            }
        }
        match input.trim() {
            "stop" => {
                shutdown.notify_one();
                println!("停机指令已激活，服务器将停止接受新连接...");
                break;
            }
            "help" => {
                println!("== Inventory Help ==");
                println!("stop   - 发出停机信号");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("====================");
            }
            "status" => {
                println!("== Inventory 状态 ===");
                println!("当前活跃连接数: {}", active_connection.load(Ordering::SeqCst));
                println!("已存储物品数: {}", service.app().store().list().len());
                println!("====================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }
}
