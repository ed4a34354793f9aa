//! AOP 错误类型
//!
//! 配置期的错误（切面声明、代理配置）使用 `AopError`；
//! 被代理方法调用期间的错误统一是 `anyhow::Error`，目标方法的错误原样向上传播。

use chimera_core::ContainerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AopError {
    /// 既没有接口也无法确定目标类型
    #[error("TargetSource cannot determine target class: either an interface or a target is required for proxy creation")]
    NoTargetOrInterfaces,

    /// 同一通知类型注册了多个适配器
    #[error("Advice kind '{0}' is already handled by a registered adapter")]
    DuplicateAdapter(String),

    /// 没有适配器能处理的通知
    #[error("Advice object of kind '{0}' is neither a supported advice nor an advisor")]
    UnknownAdviceType(String),

    /// 通知方法所在的类型不是切面
    #[error("Advice must be declared inside an aspect type: offending method '{method}' in class [{class}]")]
    NotAnAspect { class: String, method: String },

    /// 无法识别的通知注解
    #[error("Unsupported advice type on method '{method}': {annotation}")]
    UnsupportedAdviceKind { method: String, annotation: String },

    /// @DeclareParents 没有指定默认实现
    #[error("'defaultImpl' attribute must be set on @DeclareParents field '{field}' in aspect [{aspect}]")]
    MissingDefaultImpl { aspect: String, field: String },

    /// 默认实现类型没有注册实例化函数
    #[error("No instantiation registered for introduction implementation [{0}]")]
    UnknownImplementation(String),

    /// 被引入的类型不是接口
    #[error("Introduced type [{0}] is not an interface")]
    NotAnInterface(String),

    /// 切面的实例化模型不被支持
    #[error("Unsupported aspect instantiation model '{clause}' on [{aspect}]")]
    UnsupportedPerClause { aspect: String, clause: String },

    /// 切面继承了一个具体切面
    #[error("[{aspect}] cannot extend concrete aspect [{parent}]")]
    ConcreteAspectInheritance { aspect: String, parent: String },

    /// 单例 Bean 声明了非单例的切面实例化模型
    #[error("Bean with name '{0}' is a singleton, but aspect instantiation model is not singleton")]
    AspectInstantiationModel(String),

    /// 切点表达式无效
    #[error("Invalid pointcut expression '{expression}': {message}")]
    PointcutParse { expression: String, message: String },

    /// 通知方法的参数无法绑定
    #[error("Unbound parameter '{parameter}' on advice method '{method}'")]
    UnboundAdviceParameter { method: String, parameter: String },

    /// 代理配置已冻结
    #[error("Cannot modify advisors of a frozen proxy configuration")]
    ConfigFrozen,

    /// 通知器位置越界
    #[error("Advisor index {index} is out of bounds (advisor count: {count})")]
    AdvisorIndexOutOfBounds { index: usize, count: usize },

    /// 代理不能分派该方法
    #[error("Method '{method}' is not available on proxy [{proxy}]")]
    NoSuchMethod { proxy: String, method: String },

    /// 调用时没有目标对象
    #[error("No target available for invocation of '{0}'")]
    NoTarget(String),

    #[error("{0}")]
    IllegalState(String),

    #[error(transparent)]
    Container(#[from] ContainerError),
}

pub type AopResult<T> = std::result::Result<T, AopError>;

impl From<AopError> for ContainerError {
    fn from(error: AopError) -> Self {
        match error {
            AopError::Container(inner) => inner,
            other => ContainerError::Other(anyhow::Error::new(other)),
        }
    }
}
