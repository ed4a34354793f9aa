use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chimera_aop::pointcut::{DynamicMethodMatcherPointcut, NameMatchMethodPointcut};
use chimera_aop::proxy::FRAMEWORK_PROXY;
use chimera_aop::target::EmptyTargetSource;
use chimera_aop::{
    Advice, AdvisedSupport, AopError, DefaultAopProxyFactory, DefaultPointcutAdvisor, DynValue, MethodInvocation,
    MethodTable, ProxyFactory, ProxyStrategy, Target,
};
use chimera_core::metadata::ClassSource;
use chimera_core::{ClassDef, ClassRegistry, MethodDef};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn classes() -> Arc<ClassRegistry> {
    let registry = Arc::new(ClassRegistry::new());
    registry.register(ClassDef::interface("app::Calculator").method(MethodDef::new("add").param("a", "i64").param("b", "i64")));
    registry.register(
        ClassDef::new("app::SimpleCalculator")
            .implements("app::Calculator")
            .method(MethodDef::new("add").param("a", "i64").param("b", "i64"))
            .method(MethodDef::new("reset")),
    );
    registry.register(ClassDef::new("app::Ledger").method(MethodDef::new("record").param("amount", "i64")));
    registry
}

fn calculator() -> Arc<dyn Target> {
    Arc::new(
        MethodTable::new("app::SimpleCalculator")
            .method("add", |args| {
                let a = args[0].downcast_ref::<i64>().copied().unwrap_or_default();
                let b = args[1].downcast_ref::<i64>().copied().unwrap_or_default();
                Ok(Some(Arc::new(a + b) as DynValue))
            })
            .method("reset", |_| Ok(None)),
    )
}

fn recording(log: &Arc<Mutex<Vec<String>>>, label: &'static str) -> Advice {
    let log = Arc::clone(log);
    Advice::around(move |invocation: &mut MethodInvocation| {
        log.lock().push(format!("{}:enter", label));
        let result = invocation.proceed();
        log.lock().push(format!("{}:exit", label));
        result
    })
}

fn sum(result: chimera_aop::InvocationResult) -> i64 {
    *result.unwrap().unwrap().downcast::<i64>().unwrap()
}

#[test]
fn test_first_declared_advisor_wraps_outermost() {
    let source: Arc<dyn ClassSource> = classes();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut factory = ProxyFactory::for_target(calculator(), source);
    factory.add_advice(recording(&log, "outer")).unwrap();
    factory.add_advice(recording(&log, "inner")).unwrap();

    let proxy = factory.get_proxy().unwrap();
    assert_eq!(sum(proxy.invoke("add", vec![Arc::new(2_i64), Arc::new(3_i64)])), 5);
    assert_eq!(
        *log.lock(),
        vec!["outer:enter", "inner:enter", "inner:exit", "outer:exit"]
    );
}

#[test]
fn test_static_and_dynamic_advisors_across_calls() {
    let source: Arc<dyn ClassSource> = classes();
    let static_hits = Arc::new(AtomicUsize::new(0));
    let dynamic_hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&static_hits);
    let a1 = DefaultPointcutAdvisor::new(
        Arc::new(NameMatchMethodPointcut::with_names(["add"])),
        Advice::around(move |inv: &mut MethodInvocation| {
            counter.fetch_add(1, Ordering::SeqCst);
            inv.proceed()
        }),
    );
    let counter = Arc::clone(&dynamic_hits);
    let a2 = DefaultPointcutAdvisor::new(
        Arc::new(DynamicMethodMatcherPointcut::new(|_, _, args| {
            args.first().and_then(|a| a.downcast_ref::<i64>()).is_some_and(|a| *a < 0)
        })),
        Advice::around(move |inv: &mut MethodInvocation| {
            counter.fetch_add(1, Ordering::SeqCst);
            inv.proceed()
        }),
    );

    let mut factory = ProxyFactory::for_target(calculator(), Arc::clone(&source));
    factory.add_advisor(Arc::new(a1)).unwrap();
    factory.add_advisor(Arc::new(a2)).unwrap();
    let proxy = factory.get_proxy().unwrap();

    let add = source.find_class("app::SimpleCalculator").unwrap().find_method("add").unwrap().clone();
    let chain = proxy
        .advised()
        .interceptors_and_dynamic_advice(&add, Some("app::SimpleCalculator"))
        .unwrap();
    assert_eq!(chain.len(), 2);
    assert!(!chain[0].is_dynamic());
    assert!(chain[1].is_dynamic());

    assert_eq!(sum(proxy.invoke("add", vec![Arc::new(-1_i64), Arc::new(3_i64)])), 2);
    assert_eq!(static_hits.load(Ordering::SeqCst), 1);
    assert_eq!(dynamic_hits.load(Ordering::SeqCst), 1);

    assert_eq!(sum(proxy.invoke("add", vec![Arc::new(1_i64), Arc::new(3_i64)])), 4);
    assert_eq!(static_hits.load(Ordering::SeqCst), 2);
    assert_eq!(dynamic_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_proxy_strategy_selection() {
    let source: Arc<dyn ClassSource> = classes();
    let aop_proxy_factory = DefaultAopProxyFactory::new();

    // (a) 没有接口，具体目标类型
    let mut config = AdvisedSupport::new(Arc::clone(&source));
    config.set_target(Arc::new(MethodTable::new("app::Ledger")));
    assert_eq!(aop_proxy_factory.select_strategy(&config).unwrap(), ProxyStrategy::Subclass);

    // (b) 唯一的接口是框架代理标记
    config.add_interface(FRAMEWORK_PROXY);
    assert_eq!(aop_proxy_factory.select_strategy(&config).unwrap(), ProxyStrategy::Subclass);

    // (c) 要求子类代理，但目标类型本身是接口
    let mut config = AdvisedSupport::new(Arc::clone(&source));
    config.set_target_source(Arc::new(EmptyTargetSource::for_class("app::Calculator")));
    config.set_proxy_target_class(true);
    assert_eq!(aop_proxy_factory.select_strategy(&config).unwrap(), ProxyStrategy::Interface);

    // (d) 一个真正的用户接口
    let mut config = AdvisedSupport::new(Arc::clone(&source));
    config.set_target(calculator());
    config.add_interface("app::Calculator");
    assert_eq!(aop_proxy_factory.select_strategy(&config).unwrap(), ProxyStrategy::Interface);

    let config = AdvisedSupport::new(source);
    assert!(matches!(
        aop_proxy_factory.select_strategy(&config),
        Err(AopError::NoTargetOrInterfaces)
    ));
}

#[derive(Debug, thiserror::Error)]
#[error("ledger is closed")]
struct LedgerClosed;

#[test]
fn test_target_errors_pass_through_unchanged() {
    let source: Arc<dyn ClassSource> = classes();
    let target: Arc<dyn Target> =
        Arc::new(MethodTable::new("app::Ledger").method("record", |_| Err(LedgerClosed.into())));
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);

    let mut factory = ProxyFactory::for_target(target, source);
    factory
        .add_advice(Advice::around(move |inv: &mut MethodInvocation| {
            counter.fetch_add(1, Ordering::SeqCst);
            inv.proceed()
        }))
        .unwrap();
    let proxy = factory.get_proxy().unwrap();

    let error = proxy.invoke("record", vec![Arc::new(10_i64)]).unwrap_err();
    assert!(error.downcast_ref::<LedgerClosed>().is_some());
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_adding_advisor_rebinds_existing_proxy() {
    let source: Arc<dyn ClassSource> = classes();
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut factory = ProxyFactory::for_target(calculator(), source);
    factory.add_advice(recording(&log, "first")).unwrap();
    let proxy = factory.get_proxy().unwrap();
    let version = proxy.advised().version();

    proxy.add_advisor_at(0, Arc::new(DefaultPointcutAdvisor::for_advice(recording(&log, "zeroth")))).unwrap();
    assert!(proxy.advised().version() > version);

    proxy.invoke("add", vec![Arc::new(1_i64), Arc::new(1_i64)]).unwrap();
    assert_eq!(
        *log.lock(),
        vec!["zeroth:enter", "first:enter", "first:exit", "zeroth:exit"]
    );

    // 工厂的配置不受影响
    assert_eq!(factory.advised().advisor_count(), 1);
}
