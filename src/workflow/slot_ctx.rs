//! 题位上下文
//!
//! 封装"我正在生成整卷中的第几题、什么章节、多少分"这一信息

use std::fmt::Display;

/// 题位上下文
#[derive(Debug, Clone)]
pub struct SlotCtx {
    /// 题位序号（从 1 开始，同时作为题号）
    pub slot_index: usize,

    /// 整卷题位总数（仅用于日志显示）
    pub total_slots: usize,

    /// 规范章节
    pub section: String,

    pub marks: u32,
}

impl SlotCtx {
    pub fn new(slot_index: usize, total_slots: usize, section: String, marks: u32) -> Self {
        Self {
            slot_index,
            total_slots,
            section,
            marks,
        }
    }

    pub fn question_number(&self) -> String {
        self.slot_index.to_string()
    }
}

impl Display for SlotCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[题位 {}/{} {} {}分]",
            self.slot_index, self.total_slots, self.section, self.marks
        )
    }
}
