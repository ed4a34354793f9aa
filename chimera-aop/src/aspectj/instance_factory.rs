//! 切面实例工厂
//!
//! 通知器在创建时不实例化切面，第一次执行通知时才通过工厂取得切面实例。

use std::fmt;
use std::sync::{Arc, Weak};

use chimera_core::{BeanFactory, ContainerError, DynBean};
use once_cell::sync::OnceCell;

use super::metadata::AspectMetadata;
use crate::error::{AopError, AopResult};

pub trait AspectInstanceFactory: Send + Sync {
    fn aspect_instance(&self) -> anyhow::Result<DynBean>;

    fn aspect_metadata(&self) -> &AspectMetadata;

    /// 多个切面作用于同一连接点时的顺序
    fn order(&self) -> i32 {
        self.aspect_metadata().order()
    }

    /// 切面实例是否已经创建
    fn is_materialized(&self) -> bool {
        true
    }
}

/// 已经存在的切面实例
pub struct SingletonMetadataAwareAspectInstanceFactory {
    instance: DynBean,
    metadata: AspectMetadata,
}

impl SingletonMetadataAwareAspectInstanceFactory {
    pub fn new(instance: DynBean, metadata: AspectMetadata) -> Self {
        Self { instance, metadata }
    }
}

impl AspectInstanceFactory for SingletonMetadataAwareAspectInstanceFactory {
    fn aspect_instance(&self) -> anyhow::Result<DynBean> {
        Ok(Arc::clone(&self.instance))
    }

    fn aspect_metadata(&self) -> &AspectMetadata {
        &self.metadata
    }
}

/// 从容器按名称取切面 Bean
///
/// 单例 Bean 每次得到同一个实例，原型 Bean 每次得到新实例
pub struct BeanFactoryAspectInstanceFactory {
    factory: Weak<dyn BeanFactory>,
    bean_name: String,
    metadata: AspectMetadata,
}

impl BeanFactoryAspectInstanceFactory {
    pub fn new(factory: &Arc<dyn BeanFactory>, bean_name: impl Into<String>, metadata: AspectMetadata) -> Self {
        Self {
            factory: Arc::downgrade(factory),
            bean_name: bean_name.into(),
            metadata,
        }
    }

    /// 切面 Bean 必须是原型作用域
    pub fn prototype(
        factory: &Arc<dyn BeanFactory>,
        bean_name: impl Into<String>,
        metadata: AspectMetadata,
    ) -> AopResult<Self> {
        let bean_name = bean_name.into();
        if !factory.is_prototype(&bean_name)? {
            return Err(AopError::IllegalState(format!(
                "Cannot use prototype aspect instance factory for bean '{}': bean is not a prototype",
                bean_name
            )));
        }
        Ok(Self::new(factory, bean_name, metadata))
    }

    pub fn bean_name(&self) -> &str {
        &self.bean_name
    }
}

impl AspectInstanceFactory for BeanFactoryAspectInstanceFactory {
    fn aspect_instance(&self) -> anyhow::Result<DynBean> {
        let factory = self.factory.upgrade().ok_or_else(|| {
            ContainerError::creation(
                &self.bean_name,
                AopError::IllegalState("Bean factory is no longer available".to_string()),
            )
        })?;
        let instance = factory
            .get_bean(&self.bean_name)
            .map_err(|e| ContainerError::creation(&self.bean_name, e))?;
        Ok(instance)
    }

    fn aspect_metadata(&self) -> &AspectMetadata {
        &self.metadata
    }
}

impl fmt::Debug for BeanFactoryAspectInstanceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanFactoryAspectInstanceFactory")
            .field("bean_name", &self.bean_name)
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// 切面实例只创建一次
pub struct LazySingletonAspectInstanceFactoryDecorator {
    inner: Arc<dyn AspectInstanceFactory>,
    instance: OnceCell<DynBean>,
}

impl LazySingletonAspectInstanceFactoryDecorator {
    pub fn new(inner: Arc<dyn AspectInstanceFactory>) -> Self {
        Self {
            inner,
            instance: OnceCell::new(),
        }
    }
}

impl AspectInstanceFactory for LazySingletonAspectInstanceFactoryDecorator {
    fn aspect_instance(&self) -> anyhow::Result<DynBean> {
        let instance = self.instance.get_or_try_init(|| {
            tracing::debug!(
                "Instantiating aspect '{}'",
                self.inner.aspect_metadata().aspect_name()
            );
            self.inner.aspect_instance()
        })?;
        Ok(Arc::clone(instance))
    }

    fn aspect_metadata(&self) -> &AspectMetadata {
        self.inner.aspect_metadata()
    }

    fn order(&self) -> i32 {
        self.inner.order()
    }

    fn is_materialized(&self) -> bool {
        self.instance.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aspectj::annotations::ASPECT;
    use chimera_core::{Annotation, ClassDef, ClassRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFactory {
        created: AtomicUsize,
        metadata: AspectMetadata,
    }

    impl AspectInstanceFactory for CountingFactory {
        fn aspect_instance(&self) -> anyhow::Result<DynBean> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(n))
        }

        fn aspect_metadata(&self) -> &AspectMetadata {
            &self.metadata
        }
    }

    #[test]
    fn test_lazy_decorator_creates_once() {
        let registry = ClassRegistry::new();
        registry.register(ClassDef::new("app::TimingAspect").annotated(Annotation::new(ASPECT)));
        let metadata = AspectMetadata::new("app::TimingAspect", "timingAspect", &registry).unwrap();
        let inner = Arc::new(CountingFactory {
            created: AtomicUsize::new(0),
            metadata,
        });
        let lazy = LazySingletonAspectInstanceFactoryDecorator::new(inner.clone());

        assert!(!lazy.is_materialized());
        let first = lazy.aspect_instance().unwrap();
        let second = lazy.aspect_instance().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(lazy.is_materialized());
        assert_eq!(inner.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_instantiation_failure_names_aspect_bean() {
        use chimera_core::{
            BeanDefinition, BeanDefinitionRegistry, DefaultListableBeanFactory, MetadataSources, SupplierKey,
        };

        let registry = Arc::new(ClassRegistry::new());
        registry.register(ClassDef::new("app::AuditAspect").annotated(Annotation::new(ASPECT)));
        registry.register(ClassDef::new("app::BrokenAspect").annotated(Annotation::new(ASPECT)));
        let container = DefaultListableBeanFactory::new_shared(MetadataSources::with_registry(Arc::clone(&registry)));
        container
            .register_bean_definition("auditAspect", BeanDefinition::for_class("app::AuditAspect"))
            .unwrap();
        container
            .register_bean_definition("brokenAspect", BeanDefinition::for_class("app::BrokenAspect"))
            .unwrap();
        container.register_supplier(SupplierKey::Bean("brokenAspect".into()), |_| {
            Err(anyhow::anyhow!("aspect dependencies unavailable"))
        });
        let factory: Arc<dyn BeanFactory> = container;

        // 没有实例提供者
        let metadata = AspectMetadata::new("app::AuditAspect", "auditAspect", &*registry).unwrap();
        let error = BeanFactoryAspectInstanceFactory::new(&factory, "auditAspect", metadata)
            .aspect_instance()
            .unwrap_err();
        match error.downcast_ref::<ContainerError>() {
            Some(ContainerError::BeanCreation { name, .. }) => assert_eq!(name, "auditAspect"),
            other => panic!("expected bean creation error, got {:?}", other),
        }

        // 提供者本身失败，原因保留在错误链中
        let metadata = AspectMetadata::new("app::BrokenAspect", "brokenAspect", &*registry).unwrap();
        let error = BeanFactoryAspectInstanceFactory::new(&factory, "brokenAspect", metadata)
            .aspect_instance()
            .unwrap_err();
        match error.downcast_ref::<ContainerError>() {
            Some(ContainerError::BeanCreation { name, .. }) => assert_eq!(name, "brokenAspect"),
            other => panic!("expected bean creation error, got {:?}", other),
        }
        assert!(error.chain().any(|cause| cause.to_string().contains("aspect dependencies unavailable")));
    }
}
