//! Utility functions for the container
//!
//! This module provides common helpers used throughout the crate:
//! bean-name casing rule and creation tracking for circular reference detection.

/// Naming convention utilities for bean names
pub mod naming {
    /// Converts a type's short name to a bean name.
    ///
    /// The first character is lowercased, unless the first two characters are
    /// both uppercase, in which case the name is kept as-is (`URLService`
    /// stays `URLService`). This mirrors the classic JavaBeans decapitalize rule.
    ///
    /// # Examples
    ///
    /// ```
    /// use chimera_core::utils::naming::decapitalize;
    ///
    /// assert_eq!(decapitalize("UserService"), "userService");
    /// assert_eq!(decapitalize("URLService"), "URLService");
    /// assert_eq!(decapitalize("A"), "a");
    /// assert_eq!(decapitalize(""), "");
    /// ```
    pub fn decapitalize(s: &str) -> String {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (None, _) => String::new(),
            (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
                s.to_string()
            }
            (Some(first), _) => {
                let mut result = String::with_capacity(s.len());
                result.extend(first.to_lowercase());
                result.push_str(&s[first.len_utf8()..]);
                result
            }
        }
    }
}

/// Creation tracking utilities
pub mod dependency {
    use parking_lot::Mutex;

    /// Tracks beans currently being created to detect circular references.
    ///
    /// Keeps insertion order so error messages can show the chain that led back
    /// to the bean.
    #[derive(Debug, Default)]
    pub struct CreationTracker {
        creating: Mutex<Vec<String>>,
    }

    impl CreationTracker {
        /// Creates a new empty creation tracker.
        pub fn new() -> Self {
            Self::default()
        }

        /// Checks if a bean is currently being created.
        pub fn is_creating(&self, name: &str) -> bool {
            self.creating.lock().iter().any(|n| n == name)
        }

        /// Marks a bean as being created.
        ///
        /// Returns `false` if the bean was already in the creating set
        /// (circular reference detected).
        pub fn start_creating(&self, name: &str) -> bool {
            let mut creating = self.creating.lock();
            if creating.iter().any(|n| n == name) {
                return false;
            }
            creating.push(name.to_string());
            true
        }

        /// Marks a bean as finished being created.
        pub fn finish_creating(&self, name: &str) {
            self.creating.lock().retain(|n| n != name);
        }

        /// Gets a snapshot of all beans currently being created, oldest first.
        pub fn current_creating(&self) -> Vec<String> {
            self.creating.lock().clone()
        }

        /// Number of distinct beans in creation.
        pub fn len(&self) -> usize {
            self.creating.lock().len()
        }

        pub fn is_empty(&self) -> bool {
            self.creating.lock().is_empty()
        }
    }

    /// Clears the creation mark when dropped, even on early return.
    pub struct CreationGuard<'a> {
        tracker: &'a CreationTracker,
        name: String,
    }

    impl<'a> CreationGuard<'a> {
        pub fn new(tracker: &'a CreationTracker, name: &str) -> Self {
            Self {
                tracker,
                name: name.to_string(),
            }
        }
    }

    impl Drop for CreationGuard<'_> {
        fn drop(&mut self) {
            self.tracker.finish_creating(&self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    mod naming_tests {
        use super::super::naming::*;

        #[test]
        fn test_decapitalize() {
            assert_eq!(decapitalize("UserService"), "userService");
            assert_eq!(decapitalize("DatabaseService"), "databaseService");
            assert_eq!(decapitalize("A"), "a");
            assert_eq!(decapitalize("AB"), "AB");
            assert_eq!(decapitalize("URLService"), "URLService");
            assert_eq!(decapitalize(""), "");
            assert_eq!(decapitalize("lowerCase"), "lowerCase");
        }
    }

    mod dependency_tests {
        use super::super::dependency::*;

        #[test]
        fn test_creation_tracker() {
            let tracker = CreationTracker::new();

            assert!(!tracker.is_creating("serviceA"));
            assert!(tracker.start_creating("serviceA"));
            assert!(tracker.is_creating("serviceA"));

            // 第二次进入说明存在循环引用
            assert!(!tracker.start_creating("serviceA"));

            tracker.finish_creating("serviceA");
            assert!(!tracker.is_creating("serviceA"));
        }

        #[test]
        fn test_guard_clears_on_drop() {
            let tracker = CreationTracker::new();
            tracker.start_creating("serviceA");
            tracker.start_creating("serviceB");
            assert_eq!(tracker.current_creating(), vec!["serviceA", "serviceB"]);
            {
                let _guard = CreationGuard::new(&tracker, "serviceB");
            }
            assert_eq!(tracker.current_creating(), vec!["serviceA"]);
            assert_eq!(tracker.len(), 1);
        }
    }
}
