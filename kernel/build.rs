//! Rux 实时调度核心构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml（或 build/.config）配置文件
//! 2. 在 OUT_DIR 中生成 config 常量代码

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

/// 解析 build/.config 文件（简单 key=value 格式）
///
/// key 的第一个下划线之前是 section 名，例如 `sched_max_tasks=128`
fn parse_dot_config(content: &str) -> toml::Value {
    let mut sections: HashMap<String, HashMap<String, toml::Value>> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();

        // 跳过注释和空行
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(eq_pos) = line.find('=') else {
            continue;
        };
        let key = &line[..eq_pos];
        let value = line[eq_pos + 1..].trim();

        let Some(underscore_pos) = key.find('_') else {
            continue;
        };
        let section = &key[..underscore_pos];
        let config_key = &key[underscore_pos + 1..];

        let parsed_value = if value == "true" {
            toml::Value::Boolean(true)
        } else if value == "false" {
            toml::Value::Boolean(false)
        } else if let Ok(int_val) = value.parse::<i64>() {
            toml::Value::Integer(int_val)
        } else {
            toml::Value::String(value.trim_matches('"').to_string())
        };

        sections
            .entry(section.to_string())
            .or_default()
            .insert(config_key.to_string(), parsed_value);
    }

    let mut root_map = toml::map::Map::new();
    for (section_name, section_data) in sections {
        let mut toml_map = toml::map::Map::new();
        for (k, v) in section_data {
            toml_map.insert(k, v);
        }
        root_map.insert(section_name, toml::Value::Table(toml_map));
    }

    toml::Value::Table(root_map)
}

fn int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn string<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=../build/.config");
    println!("cargo:rerun-if-changed=build.rs");

    // 优先读取 build/.config，回退到 Kernel.toml，都没有就用默认值
    let config = if let Ok(content) = fs::read_to_string("../build/.config") {
        println!("cargo:warning=Using build/.config configuration");
        parse_dot_config(&content)
    } else if let Ok(content) = fs::read_to_string("../Kernel.toml") {
        match content.parse::<toml::Value>() {
            Ok(value) => value,
            Err(e) => panic!("Kernel.toml 解析失败: {}", e),
        }
    } else {
        toml::Value::Table(toml::map::Map::new())
    };

    let log_level = string(&config, "debug", "log_level", "info");
    println!("cargo:rustc-env=RUX_RT_LOG_LEVEL={}", log_level);

    generate_config_code(&config);
}

fn generate_config_code(config: &toml::Value) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));

    let name = string(config, "general", "name", "Rux-RT");
    let version = string(config, "general", "version", "0.1.0");

    let max_cpus = int(config, "smp", "max_cpus", 4).max(1);
    let max_tasks = int(config, "sched", "max_tasks", 256).max(1);
    let rr_quantum = int(config, "sched", "rr_quantum_ticks", 10).max(1);
    let max_depth = int(config, "sched", "max_donation_depth", 32).max(1);
    let max_owned = int(config, "sched", "max_owned_resources", 8).max(1);
    let name_max = int(config, "sched", "task_name_max", 32).max(1);
    let oneshot = string(config, "timer", "mode", "periodic") == "oneshot";
    let heap_kb = int(config, "memory", "rt_heap_kb", 256).max(1);

    // 注意：生成的文件通过 include! 引入，不能包含 `//!` 内部文档注释
    let code = format!(
        r#"// Rux 实时调度核心配置（自动生成）
//
// 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

/// 配置名称
pub const KERNEL_NAME: &str = "{name}";

/// 配置版本
pub const KERNEL_VERSION: &str = "{version}";

/// 最大 CPU 数量
pub const MAX_CPUS: usize = {max_cpus};

/// 任务表容量
pub const MAX_TASKS: usize = {max_tasks};

/// 时间片轮转的默认时间片 (tick)
pub const RR_QUANTUM_TICKS: u64 = {rr_quantum};

/// 优先级继承链的最大遍历深度
pub const MAX_DONATION_DEPTH: usize = {max_depth};

/// 单个任务预分配的持有资源容量
pub const MAX_OWNED_RESOURCES: usize = {max_owned};

/// 任务名最大长度（字节）
pub const TASK_NAME_MAX: usize = {name_max};

/// 是否使用单次触发 (oneshot) 定时器
pub const TIMER_ONESHOT: bool = {oneshot};

/// 实时内存池大小（字节）
pub const RT_HEAP_SIZE: usize = {heap_size};
"#,
        heap_size = heap_kb * 1024,
    );

    let path = out_dir.join("config.rs");
    if let Err(e) = fs::write(&path, code) {
        panic!("无法写入 {}: {}", path.display(), e);
    }
}
