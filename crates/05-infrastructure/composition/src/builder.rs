//! 容器启动器

use crate::infrastructure::ContainerInfrastructure;
use di_abstractions::{
    CompilerPass, ContainerBuilder, Instance, PassStage, ServiceContainer, ServiceProvider,
};
use di_impl::{ContainerCompiler, CONFIG_PARAMETER};
use infrastructure_common::{ContainerConfig, InfrastructureError, InfrastructureResult};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 容器启动器
///
/// 使用建造者模式收集服务提供者、参数和配置，然后一次性编译出运行时容器
pub struct ContainerBootstrapper {
    /// 服务提供者列表
    providers: Vec<Box<dyn ServiceProvider>>,
    /// 直接注册的编译步骤
    passes: Vec<(PassStage, Box<dyn CompilerPass>)>,
    /// 参数
    parameters: Vec<(String, Value)>,
    /// 编译完成后写入的合成服务
    synthetic: Vec<(String, Instance)>,
    /// 编译配置
    container_config: ContainerConfig,
    /// 是否启用日志初始化
    logging_enabled: bool,
    /// 日志配置
    logging_config: LoggingConfig,
}

impl ContainerBootstrapper {
    /// 创建新的启动器
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            passes: Vec::new(),
            parameters: Vec::new(),
            synthetic: Vec::new(),
            container_config: ContainerConfig::default(),
            logging_enabled: false, // 默认不初始化日志，避免测试中重复初始化
            logging_config: LoggingConfig::default(),
        }
    }

    /// 添加服务提供者
    pub fn add_provider<T: ServiceProvider + 'static>(mut self, provider: T) -> Self {
        info!("添加服务提供者: {}", provider.name());
        self.providers.push(Box::new(provider));
        self
    }

    /// 直接添加编译步骤
    pub fn add_pass<T: CompilerPass + 'static>(mut self, stage: PassStage, pass: T) -> Self {
        debug!("添加编译步骤 {} ({})", pass.name(), stage);
        self.passes.push((stage, Box::new(pass)));
        self
    }

    /// 设置参数
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push((name.into(), value.into()));
        self
    }

    /// 设置选项定义读取的配置树
    pub fn with_options(self, tree: Value) -> Self {
        self.with_parameter(CONFIG_PARAMETER, tree)
    }

    /// 预置合成服务
    pub fn with_synthetic(mut self, id: impl Into<String>, instance: Instance) -> Self {
        self.synthetic.push((id.into(), instance));
        self
    }

    /// 设置编译配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.container_config = config;
        self
    }

    /// 从配置树读取编译配置
    pub fn with_config_value(self, value: Value) -> InfrastructureResult<Self> {
        let config = ContainerConfig::from_value(value)?;
        Ok(self.with_config(config))
    }

    /// 配置日志
    pub fn with_logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = config;
        self.logging_enabled = true;
        self
    }

    /// 自动配置开发环境：保留调试元数据
    pub fn auto_configure_development(mut self) -> Self {
        info!("自动配置开发环境");
        self.container_config = ContainerConfig {
            class_name: self.container_config.class_name,
            namespace: self.container_config.namespace,
            ..ContainerConfig::development()
        };
        self
    }

    /// 自动配置生产环境：按服务拆分编译单元
    pub fn auto_configure_production(mut self) -> Self {
        info!("自动配置生产环境");
        self.container_config = ContainerConfig {
            class_name: self.container_config.class_name,
            namespace: self.container_config.namespace,
            ..ContainerConfig::production()
        };
        self
    }

    /// 编译容器
    pub fn build(self) -> InfrastructureResult<ContainerInfrastructure> {
        info!("开始构建容器");

        // 只有在明确配置了日志时才初始化日志
        if self.logging_enabled {
            self.logging_config.initialize()?;
        }

        let mut builder = ContainerBuilder::new();
        for (name, value) in self.parameters {
            builder.set_parameter(name, value)?;
        }
        for provider in &self.providers {
            builder.register(provider.as_ref())?;
        }
        for (stage, pass) in self.passes {
            builder.add_pass(stage, pass)?;
        }

        let compiler = ContainerCompiler::new(self.container_config.clone());
        let (compiled, report) = compiler.compile_with_report(&mut builder)?;
        let manifest = if compiled.is_debug() {
            Some(compiled.manifest_json()?)
        } else {
            None
        };

        let providers = builder.registered_providers().map(str::to_string).collect();
        let infrastructure = ContainerInfrastructure::new(
            compiled,
            self.container_config,
            providers,
            report.unwrap_or_default(),
            manifest,
        );
        for (id, instance) in self.synthetic {
            infrastructure.container().set(&id, instance)?;
        }

        info!("容器构建完成");
        Ok(infrastructure)
    }
}

impl Default for ContainerBootstrapper {
    fn default() -> Self {
        Self::new()
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: tracing::Level,
    /// 过滤指令，例如 `di_impl=debug`，优先于日志级别
    pub filter: Option<String>,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            filter: None,
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            level: tracing::Level::DEBUG,
            filter: None,
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            level: tracing::Level::INFO,
            filter: None,
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 设置过滤指令
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 构造过滤器：显式指令优先，其次是 `RUST_LOG`，最后是日志级别
    pub fn env_filter(&self) -> InfrastructureResult<EnvFilter> {
        match &self.filter {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|e| InfrastructureError::BootstrapFailed {
                    message: format!("日志过滤指令无效: {}", e),
                })
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))),
        }
    }

    /// 初始化全局日志
    pub fn initialize(&self) -> InfrastructureResult<()> {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter()?)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_file(self.show_file)
            .with_line_number(self.show_line_number);

        if self.json_format {
            subscriber.json().try_init()
        } else {
            subscriber.try_init()
        }
        .map_err(|e| InfrastructureError::BootstrapFailed {
            message: format!("日志初始化失败: {}", e),
        })?;

        info!("日志系统初始化完成");
        Ok(())
    }
}
