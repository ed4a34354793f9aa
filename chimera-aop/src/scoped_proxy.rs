//! 作用域代理
//!
//! 作用域 Bean 的定义被改名为 `scopedTarget.xxx`，原名称注册为
//! `ScopedProxyFactoryBean`。代理每次调用都从容器取目标，
//! 并引入 `ScopedObject` 接口以取得当前的目标对象。

use std::sync::Arc;

use chimera_core::metadata::class_registry::all_interfaces_in;
use chimera_core::metadata::ClassSource;
use chimera_core::{
    BeanFactory, ClassDef, ClassRegistration, CreationContext, DynBean, MethodDef, SupplierRegistration,
    SCOPED_PROXY_FACTORY_BEAN,
};

use crate::advisor::{DefaultIntroductionAdvisor, DelegatingIntroductionInterceptor};
use crate::aspectj::annotations::attributes;
use crate::auto_proxy::BeanFactoryClassSource;
use crate::error::{AopError, AopResult};
use crate::proxy::{DefaultAopProxyFactory, Proxy, ProxyFactory, ADVISED, FRAMEWORK_PROXY};
use crate::target::{into_bean, DynValue, MethodTable, SimpleBeanTargetSource, TargetSource};

/// 作用域代理引入的接口
pub const SCOPED_OBJECT: &str = "chimera::aop::ScopedObject";

/// 定义属性：目标 Bean 名称
pub const TARGET_BEAN_NAME_ATTRIBUTE: &str = "targetBeanName";

fn scoped_object() -> ClassDef {
    ClassDef::interface(SCOPED_OBJECT).method(MethodDef::new("get_target_object"))
}

inventory::submit! { ClassRegistration { describe: scoped_object } }

/// 为作用域 Bean 创建代理
pub struct ScopedProxyFactoryBean {
    factory: Arc<dyn BeanFactory>,
    target_bean_name: String,
    proxy_target_class: bool,
}

impl ScopedProxyFactoryBean {
    pub fn new(factory: &Arc<dyn BeanFactory>, target_bean_name: impl Into<String>) -> Self {
        Self {
            factory: Arc::clone(factory),
            target_bean_name: target_bean_name.into(),
            proxy_target_class: true,
        }
    }

    pub fn with_proxy_target_class(mut self, value: bool) -> Self {
        self.proxy_target_class = value;
        self
    }

    pub fn target_bean_name(&self) -> &str {
        &self.target_bean_name
    }

    pub fn get_object(&self) -> AopResult<Arc<Proxy>> {
        let target_source = Arc::new(SimpleBeanTargetSource::new(&self.factory, &self.target_bean_name));
        let target_class = target_source.target_class().ok_or_else(|| {
            AopError::IllegalState(format!(
                "Cannot create scoped proxy for bean '{}': target type not determinable",
                self.target_bean_name
            ))
        })?;

        let class_source: Arc<dyn ClassSource> = Arc::new(BeanFactoryClassSource::new(&self.factory));
        let mut proxy_factory = ProxyFactory::new(Arc::clone(&class_source));
        if let Some(metadata) = self.factory.class_metadata() {
            proxy_factory = proxy_factory
                .with_aop_proxy_factory(DefaultAopProxyFactory::new().with_class_registry(Arc::clone(metadata.class_registry())));
        }
        if self.proxy_target_class {
            proxy_factory.set_proxy_target_class(true);
        } else {
            for interface in all_interfaces_in(&*class_source, &target_class) {
                if interface != FRAMEWORK_PROXY && interface != ADVISED {
                    proxy_factory.add_interface(interface);
                }
            }
        }

        let lookup = Arc::clone(&target_source);
        let delegate = MethodTable::new("chimera::aop::DefaultScopedObject").method("get_target_object", move |_| {
            let target = lookup.get_target()?.ok_or_else(|| AopError::NoTarget("get_target_object".to_string()))?;
            Ok(Some(into_bean(target) as DynValue))
        });
        proxy_factory.add_advisor(Arc::new(DefaultIntroductionAdvisor::new(Arc::new(
            DelegatingIntroductionInterceptor::new(Arc::new(delegate), vec![SCOPED_OBJECT.to_string()]),
        ))))?;
        proxy_factory.set_target_source(target_source);

        tracing::debug!(
            "Creating scoped proxy for '{}' ({}, proxy_target_class={})",
            self.target_bean_name,
            target_class,
            self.proxy_target_class
        );
        proxy_factory.get_proxy()
    }
}

fn supply_scoped_proxy(ctx: &CreationContext<'_>) -> anyhow::Result<DynBean> {
    let factory = ctx.shared_factory().ok_or_else(|| {
        AopError::IllegalState(format!("Scoped proxy '{}' requires a shared bean factory", ctx.bean_name))
    })?;
    let target_bean_name = ctx.definition.attribute(TARGET_BEAN_NAME_ATTRIBUTE).ok_or_else(|| {
        AopError::IllegalState(format!("Scoped proxy '{}' has no '{}' attribute", ctx.bean_name, TARGET_BEAN_NAME_ATTRIBUTE))
    })?;
    let proxy_target_class = ctx.definition.attribute(attributes::PROXY_TARGET_CLASS) != Some("false");
    let proxy = ScopedProxyFactoryBean::new(&factory, target_bean_name)
        .with_proxy_target_class(proxy_target_class)
        .get_object()?;
    Ok(proxy as DynBean)
}

inventory::submit! {
    SupplierRegistration {
        class_name: SCOPED_PROXY_FACTORY_BEAN,
        method: None,
        supply: supply_scoped_proxy,
    }
}
