use clap::Parser;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config/development.toml";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_cache_dir")]
    cache_dir: String,
    #[serde(default = "default_static_root")]
    static_root: String,
    #[serde(default = "default_worker_threads")]
    worker_threads: usize,
    #[serde(default = "default_photo_cache_size")]
    photo_cache_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_cache_dir() -> String {
    "./cache".to_string()
}

fn default_static_root() -> String {
    "static".to_string()
}

// 单线程事件循环
fn default_worker_threads() -> usize {
    1
}

fn default_photo_cache_size() -> usize {
    16
}

/// 命令行参数，优先级高于配置文件。
///
/// `-h` 被主机名占用，帮助信息改用 `-H/--help`。
#[derive(Parser, Debug)]
#[command(name = "inventory-service", disable_help_flag = true)]
pub struct CliArgs {
    /// server host
    #[arg(short = 'h', long)]
    pub host: Option<String>,
    /// server port
    #[arg(short = 'p', long)]
    pub port: Option<u16>,
    /// cache directory
    #[arg(short = 'c', long = "cache")]
    pub cache: Option<String>,
    /// path of the TOML configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
    /// show help
    #[arg(short = 'H', long = "help", action = clap::ArgAction::Help)]
    pub help: Option<bool>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache_dir: default_cache_dir(),
            static_root: default_static_root(),
            worker_threads: default_worker_threads(),
            photo_cache_size: default_photo_cache_size(),
        }
    }

    pub fn from_toml(filename: &str) -> Self {
        let mut file = match File::open(filename) {
            Ok(f) => f,
            Err(e) => {
                warn!("无法打开配置文件{}：{}，使用默认配置", filename, e);
                return Config::new().normalized();
            }
        };
        let mut str_val = String::new();
        if let Err(e) = file.read_to_string(&mut str_val) {
            error!("读取配置文件{}失败：{}，使用默认配置", filename, e);
            return Config::new().normalized();
        }

        let raw_config = match toml::from_str::<Config>(&str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象（{}），使用默认配置", e);
                Config::new()
            }
        };
        raw_config.normalized()
    }

    /// 以默认值为基础，指定数据目录和静态页面目录
    pub fn with_dirs(cache_dir: &Path, static_root: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_string_lossy().into_owned(),
            static_root: static_root.to_string_lossy().into_owned(),
            ..Config::new()
        }
    }

    /// 用命令行参数覆盖配置文件中的同名项
    pub fn with_overrides(mut self, args: &CliArgs) -> Self {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(cache) = &args.cache {
            self.cache_dir = cache.clone();
        }
        self
    }

    /// 对特殊取值做修正：0 个工作线程表示按 CPU 核数分配，0 容量的照片缓存不被支持。
    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.photo_cache_size == 0 {
            warn!(
                "photo_cache_size被设置为0，但目前尚不支持禁用缓存，因此该值将被改为{}。",
                default_photo_cache_size()
            );
            self.photo_cache_size = default_photo_cache_size();
        }
        self
    }
}

impl Config {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn cache_dir(&self) -> &Path {
        Path::new(&self.cache_dir)
    }

    pub fn items_dir(&self) -> PathBuf {
        self.cache_dir().join("items")
    }

    pub fn static_root(&self) -> &Path {
        Path::new(&self.static_root)
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn photo_cache_size(&self) -> usize {
        self.photo_cache_size
    }

    /// 对外公布的服务地址，用于拼接照片 URL
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
