//! 章节标签规范化
//!
//! 题库里的章节标签是从 PDF 里直接抄出来的自由文本，同一个章节会有
//! "1D Array" / "1D Arrays" / "1-D Arrays" 等多种写法。这里用静态的
//! 别名表把它们映射到唯一的规范标签，再用一张相关性表描述哪些规范
//! 章节彼此相关（例如所有数组类章节）。
//!
//! - 别名表：规范化查找键 -> 规范标签，规范标签自身也在表中，保证幂等
//! - 相关表：无序的规范标签对，自反、对称，但不要求传递

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use phf::phf_map;

/// 查找键 -> 规范标签
static SECTION_ALIASES: phf::Map<&'static str, &'static str> = phf_map! {
    "program comprehension" => "Program Comprehension",
    "code comprehension" => "Program Comprehension",
    "reading code" => "Program Comprehension",
    "computation and output" => "Computation and Output",
    "computation" => "Computation and Output",
    "computation and numerical methods" => "Computation and Numerical Methods",
    "numerical methods" => "Computation and Numerical Methods",
    "1d array" => "1D Arrays",
    "1d arrays" => "1D Arrays",
    "one dimensional array" => "1D Arrays",
    "one dimensional arrays" => "1D Arrays",
    "2d array" => "2D Arrays",
    "2d arrays" => "2D Arrays",
    "two dimensional array" => "2D Arrays",
    "two dimensional arrays" => "2D Arrays",
    "function" => "Functions",
    "functions" => "Functions",
    "function and 1d array" => "Functions and 1D Arrays",
    "function and 1d arrays" => "Functions and 1D Arrays",
    "functions and 1d array" => "Functions and 1D Arrays",
    "functions and 1d arrays" => "Functions and 1D Arrays",
    "1d arrays and functions" => "Functions and 1D Arrays",
    "2d array and function" => "2D Arrays and Functions",
    "2d array and functions" => "2D Arrays and Functions",
    "2d arrays and function" => "2D Arrays and Functions",
    "2d arrays and functions" => "2D Arrays and Functions",
    "functions and 2d arrays" => "2D Arrays and Functions",
    "algorithm" => "Algorithms",
    "algorithms" => "Algorithms",
    "algorithms sorting and searching" => "Sorting and Searching",
    "sorting and searching" => "Sorting and Searching",
    "searching and sorting" => "Sorting and Searching",
    "design thinking" => "Design Thinking",
    "simulating a physical problem" => "Simulating a Physical Problem",
    "simulation" => "Simulating a Physical Problem",
    "robot programming" => "Robot Programming",
    "robot operation" => "Robot Programming",
    "nxt robot operation" => "Robot Programming",
    "robotics" => "Robot Programming",
};

/// 规范标签 -> 章节考查内容，用于生成提示词
static SECTION_DESCRIPTIONS: phf::Map<&'static str, &'static str> = phf_map! {
    "Program Comprehension" => "reading and understanding existing code, identifying bugs, tracing execution",
    "Computation and Output" => "mathematical calculations, formulas, numerical methods, output formatting",
    "Computation and Numerical Methods" => "mathematical computations, numerical analysis, calculations",
    "1D Arrays" => "one-dimensional arrays, array manipulation, indexing, array algorithms",
    "2D Arrays" => "two-dimensional arrays, matrix operations, nested loops with arrays",
    "Functions" => "function definition, parameters, return values, function calls, modular programming",
    "Functions and 1D Arrays" => "combining functions with array operations",
    "2D Arrays and Functions" => "combining 2D arrays with functions",
    "Algorithms" => "algorithm design, sorting, searching, algorithmic thinking",
    "Sorting and Searching" => "sorting algorithms, searching algorithms, algorithm efficiency",
    "Design Thinking" => "problem-solving approach, algorithm design, program structure",
    "Simulating a Physical Problem" => "modeling physical systems, simulation programming",
    "Robot Programming" => "robot control, sensors, actuators, robot logic and movement",
};

/// 相关章节对（无序）
const RELATED_SECTIONS: &[(&str, &str)] = &[
    ("1D Arrays", "2D Arrays"),
    ("1D Arrays", "Functions and 1D Arrays"),
    ("1D Arrays", "2D Arrays and Functions"),
    ("2D Arrays", "Functions and 1D Arrays"),
    ("2D Arrays", "2D Arrays and Functions"),
    ("Functions and 1D Arrays", "2D Arrays and Functions"),
    ("Functions", "Functions and 1D Arrays"),
    ("Functions", "2D Arrays and Functions"),
    ("Algorithms", "Sorting and Searching"),
    ("Algorithms", "Design Thinking"),
    ("Computation and Output", "Computation and Numerical Methods"),
    ("Computation and Numerical Methods", "Simulating a Physical Problem"),
];

/// 题库为空时使用的默认章节
pub const DEFAULT_SECTIONS: &[&str] = &[
    "Program Comprehension",
    "Computation and Output",
    "1D Arrays",
    "2D Arrays",
    "Functions",
    "Algorithms",
    "Robot Programming",
];

/// 章节规范化器
///
/// 内置表之外还可以叠加配置文件里的别名和相关对。
#[derive(Debug, Clone, Default)]
pub struct SectionNormalizer {
    extra_aliases: HashMap<String, String>,
    extra_related: HashSet<(String, String)>,
}

impl SectionNormalizer {
    /// 只使用内置表
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置表 + 额外别名与相关对
    ///
    /// 别名的目标标签会先经过规范化，保证 `normalize` 依旧幂等。
    pub fn with_overrides<'a>(
        aliases: impl IntoIterator<Item = (&'a String, &'a String)>,
        related: impl IntoIterator<Item = &'a (String, String)>,
    ) -> Self {
        let mut normalizer = Self::new();
        for (raw, canonical) in aliases {
            normalizer.add_alias(raw, canonical);
        }
        for (a, b) in related {
            normalizer.add_related(a, b);
        }
        normalizer
    }

    pub fn add_alias(&mut self, raw: &str, canonical: &str) {
        let target = self.normalize(canonical);
        self.extra_aliases
            .insert(lookup_key(canonical), target.clone());
        self.extra_aliases.insert(lookup_key(raw), target);
    }

    pub fn add_related(&mut self, a: &str, b: &str) {
        let a = self.normalize(a);
        let b = self.normalize(b);
        self.extra_related.insert((a, b));
    }

    /// 原始标签 -> 规范标签
    ///
    /// 未知标签返回去掉首尾空白、小写化并压缩空白后的原文。
    pub fn normalize(&self, raw: &str) -> String {
        let key = lookup_key(raw);
        if let Some(canonical) = self.extra_aliases.get(&key) {
            return canonical.clone();
        }
        if let Some(canonical) = SECTION_ALIASES.get(key.as_str()) {
            return (*canonical).to_string();
        }
        fold_case(raw)
    }

    /// 两个规范标签是否相关（自反、对称）
    pub fn related(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let builtin = RELATED_SECTIONS
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a));
        builtin
            || self.extra_related.contains(&(a.to_string(), b.to_string()))
            || self.extra_related.contains(&(b.to_string(), a.to_string()))
    }

    /// 章节考查内容描述
    pub fn description(&self, canonical: &str) -> String {
        SECTION_DESCRIPTIONS
            .get(canonical)
            .map(|d| (*d).to_string())
            .unwrap_or_else(|| format!("programming concepts related to {}", canonical))
    }

    /// 内置表中的全部规范标签
    pub fn canonical_labels(&self) -> BTreeSet<String> {
        SECTION_ALIASES
            .values()
            .map(|v| (*v).to_string())
            .chain(self.extra_aliases.values().cloned())
            .collect()
    }

    /// 按规范章节汇总原始标签计数
    pub fn canonical_counts<'a>(
        &self,
        raw_counts: impl IntoIterator<Item = (&'a String, &'a usize)>,
    ) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (raw, count) in raw_counts {
            *counts.entry(self.normalize(raw)).or_insert(0) += *count;
        }
        counts
    }
}

/// 查找键：小写、连字符并入、其余标点视作空白、`&` 视作 and
fn lookup_key(raw: &str) -> String {
    let mut key = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        match c {
            '-' | '\u{2010}' | '\u{2013}' => {}
            '&' => key.push_str(" and "),
            c if c.is_alphanumeric() => key.extend(c.to_lowercase()),
            _ => key.push(' '),
        }
    }
    key.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn fold_case(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
