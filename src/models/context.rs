use serde::{Deserialize, Serialize};

/// 页面超链接引用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkRef {
    /// 链接文本
    #[serde(default)]
    pub text: String,
    /// 链接地址
    pub url: String,
}

/// 页面图片引用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageRef {
    /// 图片地址
    pub src: String,
    /// 图片替代文本
    #[serde(default)]
    pub alt: String,
}

/// 页面表格数据
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableData {
    /// 表头
    #[serde(default)]
    pub headers: Vec<String>,
    /// 数据行
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// 单次抓取的题目内容
///
/// 由页面驱动器在一次提取中产出，提取后不可变；
/// 每次抓取都会产生一个全新的实例。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionContext {
    /// 题目正文（页面全部可见文本）
    #[serde(default)]
    pub text: String,
    /// 页面超链接（按文档顺序）
    #[serde(default)]
    pub links: Vec<LinkRef>,
    /// 页面图片（按文档顺序）
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// 页面音频地址（按文档顺序）
    #[serde(default)]
    pub audio: Vec<String>,
    /// 页面表格
    #[serde(default)]
    pub tables: Vec<TableData>,
    /// 页面表单的提交地址（如果存在）
    #[serde(default)]
    pub form_action: Option<String>,
}

impl TableData {
    /// 按表头名查找列，返回该列所有能解析为数字的值
    pub fn numeric_column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.headers.iter().position(|h| h == name)?;
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(index))
                .filter_map(|cell| cell.trim().parse::<f64>().ok())
                .collect(),
        )
    }
}
