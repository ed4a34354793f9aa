use crate::constants::ORDER;
use crate::metadata::AnnotatedTypeMetadata;

/// 最高优先级
pub const HIGHEST_PRECEDENCE: i32 = i32::MIN;

/// 最低优先级（默认）
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// 可排序的组件，值越小越靠前
pub trait Ordered {
    fn order(&self) -> i32;
}

/// 读取 @Order 注解的值
pub fn order_from_metadata<M: AnnotatedTypeMetadata + ?Sized>(metadata: &M) -> Option<i32> {
    metadata
        .annotation_attributes(ORDER)
        .map(|attrs| {
            attrs
                .get_int("value")
                .map(|v| v.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
                .unwrap_or(LOWEST_PRECEDENCE)
        })
}

/// @Order 的值，没有注解时为最低优先级
pub fn order_or_lowest<M: AnnotatedTypeMetadata + ?Sized>(metadata: &M) -> i32 {
    order_from_metadata(metadata).unwrap_or(LOWEST_PRECEDENCE)
}

/// 按 order 稳定排序
pub fn sort_by_order<T, F>(items: &mut [T], order_of: F)
where
    F: Fn(&T) -> i32,
{
    items.sort_by_key(|item| order_of(item));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Annotation, ClassRegistry, MethodDef, MethodMetadata};

    #[test]
    fn test_order_from_method_metadata() {
        let registry = ClassRegistry::new();
        let ordered = MethodMetadata::new(
            MethodDef::new("a").annotated(Annotation::new(ORDER).value(5i64)),
            &registry,
        );
        let unordered = MethodMetadata::new(MethodDef::new("b"), &registry);
        assert_eq!(order_from_metadata(&ordered), Some(5));
        assert_eq!(order_or_lowest(&unordered), LOWEST_PRECEDENCE);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut items = vec![("x", 2), ("y", 1), ("z", 2)];
        sort_by_order(&mut items, |i| i.1);
        assert_eq!(items, vec![("y", 1), ("x", 2), ("z", 2)]);
    }
}
