/// ASCII 空白字符
pub const WHITESPACES: &[char] = &[' ', '\t', '\n', '\x0c', '\r'];

/// 链接类型枚举
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkType {
    Stylesheet,
    Preload,
    Icon,
    Unknown,
}

/// srcset 中的单个候选
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcSetItem<'a> {
    pub path: &'a str,
    pub descriptor: &'a str,
}

/// 解析链接类型
///
/// ## 参数
/// * `rel` - link 元素的 `rel` 属性值
///
/// ## 返回值
/// 每个以空白分隔的关系对应一个 [`LinkType`]
pub fn parse_link_type(rel: &str) -> Vec<LinkType> {
    rel.split(WHITESPACES)
        .filter(|s| !s.is_empty())
        .map(|link_type| {
            if link_type.eq_ignore_ascii_case("stylesheet") {
                LinkType::Stylesheet
            } else if link_type.eq_ignore_ascii_case("preload")
                || link_type.eq_ignore_ascii_case("modulepreload")
            {
                LinkType::Preload
            } else if link_type.eq_ignore_ascii_case("icon") {
                LinkType::Icon
            } else {
                LinkType::Unknown
            }
        })
        .collect()
}

/// 是否为样式表链接
pub fn is_stylesheet(rel: &str) -> bool {
    parse_link_type(rel).contains(&LinkType::Stylesheet)
}

/// 解析 srcset 属性
///
/// 候选 URL 是一段不含空白的字符序列，末尾的逗号属于分隔符；
/// 描述符持续到下一个顶层逗号为止（括号内的逗号不分隔）。
///
/// ## 参数
/// * `srcset` - srcset 属性值
///
/// ## 返回值
/// 按出现顺序排列的候选列表
pub fn parse_srcset(srcset: &str) -> Vec<SrcSetItem<'_>> {
    let mut items = Vec::new();
    let mut rest = srcset;

    loop {
        rest = rest.trim_start_matches(|c: char| WHITESPACES.contains(&c) || c == ',');
        if rest.is_empty() {
            break;
        }

        let url_end = rest.find(WHITESPACES).unwrap_or(rest.len());
        let (mut path, after) = rest.split_at(url_end);

        if path.ends_with(',') {
            // 没有描述符，逗号直接跟在 URL 之后
            path = path.trim_end_matches(',');
            items.push(SrcSetItem {
                path,
                descriptor: "",
            });
            rest = after;
            continue;
        }

        let mut depth = 0usize;
        let descriptor_end = after
            .char_indices()
            .find(|&(_, c)| match c {
                '(' => {
                    depth += 1;
                    false
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    false
                }
                ',' => depth == 0,
                _ => false,
            })
            .map(|(i, _)| i)
            .unwrap_or(after.len());

        items.push(SrcSetItem {
            path,
            descriptor: after[..descriptor_end].trim_matches(WHITESPACES),
        });
        rest = &after[descriptor_end..];
    }

    items
}

/// srcset 的第一个候选 URL
pub fn first_srcset_candidate(srcset: &str) -> Option<&str> {
    parse_srcset(srcset).into_iter().next().map(|item| item.path)
}
