//! Built-in translation cases: seven everyday programs and eight that
//! carry classic memory-safety or undefined-behavior hazards.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseGroup {
    Basic,
    Adversarial,
}

#[derive(Debug, Clone, Copy)]
pub struct SuiteCase {
    pub name: &'static str,
    pub group: CaseGroup,
    pub source: &'static str,
}

pub const DEFAULT_CASE: &str = "scanf_two_ints";

pub const CASES: &[SuiteCase] = &[
    SuiteCase {
        name: "scanf_two_ints",
        group: CaseGroup::Basic,
        source: r#"#include <stdio.h>

int main() {
    int a, b;
    scanf("%d%d", &a, &b);
    printf("%d\n", a + b);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "array_indexing",
        group: CaseGroup::Basic,
        source: r#"#include <stdio.h>

int main() {
    int arr[10];
    for (int i = 0; i < 10; i++) {
        arr[i] = i * 2;
    }

    int idx = 5;
    printf("%d\n", arr[idx]);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "long_long_mult",
        group: CaseGroup::Basic,
        source: r#"#include <stdio.h>

int main() {
    int x = 100000;
    int y = 100000;
    long long result = (long long)x * y;
    printf("%lld\n", result);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "malloc_array",
        group: CaseGroup::Basic,
        source: r#"#include <stdio.h>
#include <stdlib.h>

int main() {
    int n = 10;
    int *arr = (int*)malloc(n * sizeof(int));

    for (int i = 0; i < n; i++) {
        arr[i] = i * i;
    }

    printf("%d\n", arr[5]);
    free(arr);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "mixed_io_array",
        group: CaseGroup::Basic,
        source: r#"#include <stdio.h>

int main() {
    int n;
    scanf("%d", &n);

    int arr[100];
    for (int i = 0; i < n; i++) {
        scanf("%d", &arr[i]);
    }

    int sum = 0;
    for (int i = 0; i < n; i++) {
        sum += arr[i];
    }

    printf("%d\n", sum);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "simple_pointer",
        group: CaseGroup::Basic,
        source: r#"#include <stdlib.h>

int main() {
    int *p = (int*)malloc(sizeof(int));
    *p = 42;
    int value = *p;
    free(p);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "float_conversion",
        group: CaseGroup::Basic,
        source: r#"#include <stdio.h>

int main() {
    int x = 10;
    int y = 3;
    float result = (float)x / y;
    printf("%.2f\n", result);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "buffer_overflow",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdio.h>
#include <string.h>

int main() {
    char buffer[10];
    char *input = "This is a very long string that exceeds buffer size";
    strcpy(buffer, input);
    printf("%s\n", buffer);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "integer_overflow",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdio.h>
#include <limits.h>

int main() {
    int a = INT_MAX;
    int b = a + 1;
    printf("Result: %d\n", b);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "use_after_free",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdlib.h>
#include <stdio.h>

int main() {
    int *ptr = (int*)malloc(sizeof(int));
    *ptr = 42;
    free(ptr);
    int value = *ptr;
    printf("%d\n", value);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "double_free",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdlib.h>

int main() {
    int *ptr = (int*)malloc(sizeof(int));
    *ptr = 100;
    free(ptr);
    free(ptr);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "array_bounds",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdio.h>

int main() {
    int arr[5] = {1, 2, 3, 4, 5};
    int idx = 10;
    printf("%d\n", arr[idx]);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "uninitialized_read",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdio.h>

int main() {
    int x;
    printf("%d\n", x);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "format_string",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdio.h>

int main() {
    char user_input[100] = "%s%s%s%s";
    printf(user_input);
    return 0;
}
"#,
    },
    SuiteCase {
        name: "null_deref",
        group: CaseGroup::Adversarial,
        source: r#"#include <stdio.h>
#include <stdlib.h>

int main() {
    int *ptr = NULL;
    *ptr = 42;
    return 0;
}
"#,
    },
];

pub fn find(name: &str) -> Option<&'static SuiteCase> {
    CASES.iter().find(|c| c.name == name)
}

pub fn group(group: CaseGroup) -> impl Iterator<Item = &'static SuiteCase> {
    CASES.iter().filter(move |c| c.group == group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use transpile_core::analysis::{Category, Detector};

    #[test]
    fn test_suite_shape() {
        assert_eq!(CASES.len(), 15);
        assert_eq!(group(CaseGroup::Basic).count(), 7);
        assert_eq!(group(CaseGroup::Adversarial).count(), 8);
        assert!(find(DEFAULT_CASE).is_some());
        assert!(find("nope").is_none());
    }

    #[test]
    fn test_cases_trigger_expected_categories() {
        let detector = Detector::new();
        let categories = |name: &str| detector.detect(find(name).unwrap().source).categories();
        assert_eq!(categories("scanf_two_ints"), vec![Category::Io]);
        assert!(categories("malloc_array").contains(&Category::Pointer));
        assert!(categories("long_long_mult").contains(&Category::MixedType));
        assert!(categories("buffer_overflow").contains(&Category::StringBuffer));
        assert!(categories("array_indexing").contains(&Category::Array));
    }
}
