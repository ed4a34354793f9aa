//! 配置类处理
//!
//! 解析（`parser`）得到 `ConfigurationClass` 模型，再由 `reader` 转换为 Bean 定义；
//! `post_processor` 负责多轮驱动两者。

pub mod configuration_class;
pub mod import;
pub mod parser;
pub mod post_processor;
pub mod problem;
pub mod reader;
pub mod scanner;
pub mod utils;

pub use configuration_class::{BeanMethod, ConfigurationClass};
pub use import::{
    DeferredImportSelector, GroupEntry, ImportBeanDefinitionRegistrar, ImportComponent,
    ImportComponentRegistration, ImportComponentRegistry, ImportContext, ImportGroup,
    ImportGroupRegistration, ImportRegistry, ImportSelector, ImportStack,
};
pub use parser::{ConfigurationClassParser, ParserContext};
pub use post_processor::ConfigurationClassPostProcessor;
pub use problem::{CollectingProblemReporter, FailFastProblemReporter, Problem, ProblemKind, ProblemReporter};
pub use reader::ConfigurationClassBeanDefinitionReader;
pub use scanner::{ClassPathBeanDefinitionScanner, ComponentScanAnnotationParser, TypeFilter};
pub use utils::{ConfigurationClassMode, is_configuration_candidate};
