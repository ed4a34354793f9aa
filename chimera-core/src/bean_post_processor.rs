//! Bean 工厂扩展点
//!
//! `BeanDefinitionRegistryPostProcessor` 在任何 Bean 实例化之前修改定义注册表，
//! `BeanPostProcessor` 处理每个创建出来的 Bean 实例。

use std::sync::Arc;

use crate::error::ContainerResult;
use crate::registry::{DefaultListableBeanFactory, DynBean};

/// Bean 创建后、返回给调用方之前的处理钩子
///
/// 按 `order()` 升序执行，每个处理器都可以把 Bean 换成包装后的实例，
/// 自动代理创建器就是在 after 阶段把匹配的 Bean 换成代理。
pub trait BeanPostProcessor: Send + Sync {
    fn post_process_before_initialization(&self, bean: DynBean, _bean_name: &str) -> ContainerResult<DynBean> {
        Ok(bean)
    }

    fn post_process_after_initialization(&self, bean: DynBean, _bean_name: &str) -> ContainerResult<DynBean> {
        Ok(bean)
    }

    /// 日志中显示的名称
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn order(&self) -> i32 {
        crate::order::LOWEST_PRECEDENCE
    }
}

/// 带有该属性（值为 "true"）的定义会被实例化并注册为后置处理器
pub const BEAN_POST_PROCESSOR_ATTRIBUTE: &str = "chimera.beanPostProcessor";

/// 后置处理器 Bean 的实例
///
/// 容器中的 Bean 是 `dyn Any`，后置处理器以这个包装类型保存以便取回
pub struct PostProcessorBean {
    processor: Arc<dyn BeanPostProcessor>,
}

impl PostProcessorBean {
    pub fn new(processor: Arc<dyn BeanPostProcessor>) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> Arc<dyn BeanPostProcessor> {
        Arc::clone(&self.processor)
    }
}

/// 在 Bean 实例化之前处理定义注册表
///
/// 配置类处理器通过它把配置类展开为 Bean 定义
pub trait BeanDefinitionRegistryPostProcessor: Send + Sync {
    fn post_process_bean_definition_registry(
        &self,
        registry: &Arc<DefaultListableBeanFactory>,
    ) -> ContainerResult<()>;

    fn order(&self) -> i32 {
        0
    }
}
