//! 连接点（JoinPoint）
//!
//! 表示程序执行过程中的一个方法调用点，通知方法通过它访问方法与参数

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;

use chimera_core::MethodDef;

use crate::error::AopError;
use crate::invocation::MethodInvocation;
use crate::target::{DynValue, InvocationResult, Target};

/// 连接点信息
#[derive(Clone)]
pub struct JoinPoint {
    /// 目标类型名称
    pub target_class: String,

    /// 代理类型名称
    pub proxy_class: String,

    /// 被调用的方法
    pub method: Arc<MethodDef>,

    /// 方法参数
    pub args: Vec<DynValue>,

    /// 目标对象（没有目标时为 None）
    pub target: Option<Arc<dyn Target>>,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    pub fn new(
        target_class: String,
        proxy_class: String,
        method: Arc<MethodDef>,
        args: Vec<DynValue>,
        target: Option<Arc<dyn Target>>,
    ) -> Self {
        Self {
            target_class,
            proxy_class,
            method,
            args,
            target,
            timestamp: Instant::now(),
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method.name
    }

    /// 形如 `app::UserService::find_user`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_class, self.method.name)
    }

    pub fn kind(&self) -> &'static str {
        "method-execution"
    }

    /// 按类型取第 `index` 个参数
    pub fn arg<T: 'static>(&self, index: usize) -> Option<&T> {
        self.args.get(index).and_then(|a| a.downcast_ref::<T>())
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("proxy_class", &self.proxy_class)
            .field("args", &self.args.len())
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "execution({})", self.method)
    }
}

/// 可继续执行的连接点（用于 Around 通知）
///
/// 持有调用链在当前位置的独立副本，因此可以多次 `proceed()`
pub struct ProceedingJoinPoint {
    join_point: JoinPoint,
    invocation: MethodInvocation,
}

impl ProceedingJoinPoint {
    pub fn new(invocation: &MethodInvocation) -> Self {
        Self {
            join_point: invocation.join_point(),
            invocation: invocation.invocable_clone(),
        }
    }

    pub fn join_point(&self) -> &JoinPoint {
        &self.join_point
    }

    /// 继续执行原方法
    pub fn proceed(&self) -> InvocationResult {
        self.invocation.invocable_clone().proceed()
    }

    /// 用新的参数继续执行，参数个数必须一致
    pub fn proceed_with(&self, args: Vec<DynValue>) -> InvocationResult {
        if args.len() != self.join_point.args.len() {
            return Err(AopError::IllegalState(format!(
                "Expecting {} arguments to proceed, but was passed {} arguments",
                self.join_point.args.len(),
                args.len()
            ))
            .into());
        }
        let mut invocation = self.invocation.invocable_clone();
        invocation.set_arguments(args);
        invocation.proceed()
    }
}

impl Deref for ProceedingJoinPoint {
    type Target = JoinPoint;

    fn deref(&self) -> &JoinPoint {
        &self.join_point
    }
}

impl fmt::Debug for ProceedingJoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProceedingJoinPoint")
            .field("join_point", &self.join_point)
            .finish()
    }
}
