//! CSS 解析器模块
//!
//! 此模块把样式表解析为结构化的规则树，并在规则树上完成离线化重写。
//! 解析基于 cssparser 的 tokenizer，规则与声明的原始文本尽量保持不变。
//!
//! # 主要功能
//!
//! - **规则树**: `@import`、分组规则（`@media`、`@keyframes` 等）、带声明块的规则
//! - **@import内联**: 递归获取并重写被导入的样式表，在原位置展开，输出中不再有 `@import`
//! - **URL重写**: 每条声明中的第一个 `url()` 引用被替换为捕获结果中的本地路径
//! - **稳定序列化**: 序列化结果再次解析、序列化后保持不变
//!
//! # 使用示例
//!
//! ```rust
//! use pagedump::parsers::css::{parse_stylesheet, serialize_rules};
//!
//! let rules = parse_stylesheet("@media screen { body { color: red } }");
//! assert_eq!(parse_stylesheet(&serialize_rules(&rules)), rules);
//! ```

use cssparser::{serialize_string, ParseError, Parser, ParserInput, Token};
use tracing::warn;

use crate::error::{DumpError, DumpResult};
use crate::parsers::references::{LocalReference, ReferenceMapper};
use crate::parsers::stylesheets::StylesheetSource;
use crate::utils::url::{resolve_url, Url};

/// 包含嵌套规则列表的 at-rule
///
/// 这些规则的块内容按规则列表解析，其余 at-rule 与普通样式规则的块按声明块解析。
const GROUPING_AT_RULES: &[&str] = &[
    "-moz-document",
    "-moz-keyframes",
    "-o-keyframes",
    "-webkit-keyframes",
    "container",
    "document",
    "keyframes",
    "layer",
    "media",
    "scope",
    "starting-style",
    "supports",
];

/// `@import` 规则
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRule {
    pub href: String,
    /// `layer` 或 `layer(name)`，匿名层为空字符串
    pub layer: Option<String>,
    /// `supports(...)` 的条件
    pub supports: Option<String>,
    /// 媒体查询列表，可能为空
    pub media: String,
    /// 原始规则文本（不含结尾分号）
    pub source: String,
}

/// 样式表规则树中的一条规则
#[derive(Debug, Clone, PartialEq)]
pub enum CssRule {
    Import(ImportRule),
    /// 带嵌套规则列表的规则：`@media`、`@supports`、`@keyframes` 等
    Group { prelude: String, rules: Vec<CssRule> },
    /// 带声明块的规则：样式规则、`@font-face`、关键帧等
    Style { prelude: String, body: Vec<BlockItem> },
    /// 其他语句，原样保留：`@charset`、`@namespace`、`@layer a, b` 等
    Statement(String),
}

/// 声明块中的条目
#[derive(Debug, Clone, PartialEq)]
pub enum BlockItem {
    Declaration(Declaration),
    /// 嵌套规则（CSS nesting）或块内 at-rule 语句
    Rule(CssRule),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    /// 原始值文本，包括可能存在的 `!important`
    pub value: String,
}

/// 格式化带引号的CSS字符串
///
/// 使用cssparser库的标准化函数来正确格式化CSS字符串值，
/// 自动添加适当的引号并转义特殊字符。
///
/// # 示例
///
/// ```rust
/// use pagedump::parsers::css::format_quoted_string;
///
/// assert_eq!(format_quoted_string("hello world"), "\"hello world\"");
/// ```
pub fn format_quoted_string(string: &str) -> String {
    let mut res: String = "".to_string();
    let _ = serialize_string(string, &mut res);
    res
}

/// 解析样式表为规则树
pub fn parse_stylesheet(css: &str) -> Vec<CssRule> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);

    parse_rule_list(&mut parser)
}

/// 解析声明块（如 `style` 属性的内容）
pub fn parse_declarations(block: &str) -> Vec<BlockItem> {
    let mut input = ParserInput::new(block);
    let mut parser = Parser::new(&mut input);

    parse_block_body(&mut parser)
}

/// 在嵌套块内运行 `parse`，并消费块中剩余的 token
fn nested<'i, 't, T, F>(parser: &mut Parser<'i, 't>, parse: F) -> T
where
    T: Default,
    F: for<'tt> FnOnce(&mut Parser<'i, 'tt>) -> T,
{
    parser
        .parse_nested_block(|nested| {
            let result = parse(nested);
            while nested.next_including_whitespace_and_comments().is_ok() {}
            Ok::<T, ParseError<'i, ()>>(result)
        })
        .unwrap_or_default()
}

fn parse_rule_list(parser: &mut Parser) -> Vec<CssRule> {
    let mut rules = Vec::new();
    let mut start = parser.position();

    loop {
        let before = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::Semicolon => {
                rules.extend(statement(parser.slice(start..before)));
                start = parser.position();
            }
            Token::CurlyBracketBlock => {
                let prelude = clean_prelude(parser.slice(start..before));
                rules.push(block_rule(parser, prelude));
                start = parser.position();
            }
            _ => {}
        }
    }

    rules.extend(statement(parser.slice_from(start)));
    rules
}

fn parse_block_body(parser: &mut Parser) -> Vec<BlockItem> {
    let mut items = Vec::new();
    let mut start = parser.position();

    loop {
        let before = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::Semicolon => {
                items.extend(block_item(parser.slice(start..before)));
                start = parser.position();
            }
            Token::CurlyBracketBlock => {
                let prelude = clean_prelude(parser.slice(start..before));
                items.push(BlockItem::Rule(block_rule(parser, prelude)));
                start = parser.position();
            }
            _ => {}
        }
    }

    items.extend(block_item(parser.slice_from(start)));
    items
}

fn block_rule(parser: &mut Parser, prelude: String) -> CssRule {
    let is_group = at_rule_name(&prelude)
        .is_some_and(|name| GROUPING_AT_RULES.contains(&name.as_str()));

    if is_group {
        CssRule::Group {
            rules: nested(parser, parse_rule_list),
            prelude,
        }
    } else {
        CssRule::Style {
            body: nested(parser, parse_block_body),
            prelude,
        }
    }
}

fn statement(text: &str) -> Option<CssRule> {
    let text = clean_prelude(text);
    if text.is_empty() {
        return None;
    }

    if at_rule_name(&text).as_deref() == Some("import") {
        if let Some(import) = parse_import(&text) {
            return Some(CssRule::Import(import));
        }
    }

    Some(CssRule::Statement(text))
}

fn block_item(text: &str) -> Option<BlockItem> {
    let text = clean_prelude(text);
    if text.is_empty() {
        return None;
    }

    if !text.starts_with('@') {
        if let Some((name, value)) = text.split_once(':') {
            return Some(BlockItem::Declaration(Declaration {
                name: name.trim().to_string(),
                value: value.trim().to_string(),
            }));
        }
    }

    Some(BlockItem::Rule(CssRule::Statement(text)))
}

/// 去掉前导空白、注释与 HTML 注释标记
fn clean_prelude(text: &str) -> String {
    let mut rest = text.trim_start();

    loop {
        if let Some(comment) = rest.strip_prefix("/*") {
            rest = match comment.find("*/") {
                Some(end) => comment[end + 2..].trim_start(),
                None => "",
            };
        } else if let Some(after) = rest.strip_prefix("<!--") {
            rest = after.trim_start();
        } else if let Some(after) = rest.strip_prefix("-->") {
            rest = after.trim_start();
        } else {
            break;
        }
    }

    rest.trim_end().to_string()
}

fn at_rule_name(prelude: &str) -> Option<String> {
    let rest = prelude.strip_prefix('@')?;
    let end = rest
        .find(|c: char| c.is_whitespace() || matches!(c, '(' | '"' | '\'' | ';' | '{' | '/'))
        .unwrap_or(rest.len());

    Some(rest[..end].to_ascii_lowercase())
}

/// 块内第一个字符串 token 的值
fn first_string(parser: &mut Parser) -> String {
    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        if let Token::QuotedString(value) = token {
            return value.to_string();
        }
    }
    String::new()
}

/// 块内剩余的原始文本
fn remaining_text(parser: &mut Parser) -> String {
    let start = parser.position();
    while parser.next_including_whitespace_and_comments().is_ok() {}
    parser.slice_from(start).trim().to_string()
}

fn parse_import(text: &str) -> Option<ImportRule> {
    let mut input = ParserInput::new(text);
    let mut parser = Parser::new(&mut input);

    let mut href = None;
    while let Ok(token) = parser.next_including_whitespace_and_comments() {
        match token.clone() {
            Token::AtKeyword(_) | Token::WhiteSpace(_) | Token::Comment(_) => continue,
            Token::QuotedString(value) | Token::UnquotedUrl(value) => {
                href = Some(value.to_string());
            }
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                href = Some(nested(&mut parser, first_string));
            }
            _ => {}
        }
        break;
    }
    let href = href?;

    let mut layer = None;
    let mut supports = None;
    let mut media = String::new();

    loop {
        let before = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::WhiteSpace(_) | Token::Comment(_) => {}
            Token::Ident(name) if name.eq_ignore_ascii_case("layer") => {
                layer = Some(String::new());
            }
            Token::Function(name) if name.eq_ignore_ascii_case("layer") => {
                layer = Some(nested(&mut parser, remaining_text));
            }
            Token::Function(name) if name.eq_ignore_ascii_case("supports") => {
                supports = Some(nested(&mut parser, remaining_text));
            }
            _ => {
                while parser.next_including_whitespace_and_comments().is_ok() {}
                media = parser.slice_from(before).trim().to_string();
                break;
            }
        }
    }

    Some(ImportRule {
        href,
        layer,
        supports,
        media,
        source: text.to_string(),
    })
}

/// 样式表中所有 `@import` 的目标，按出现顺序，已相对 `base` 解析
pub fn collect_imports(rules: &[CssRule], base: &Url) -> Vec<Url> {
    let mut imports = Vec::new();

    for rule in rules {
        match rule {
            CssRule::Import(import) => imports.extend(resolve_url(base, &import.href)),
            CssRule::Group { rules, .. } => imports.extend(collect_imports(rules, base)),
            _ => {}
        }
    }

    imports
}

/// 序列化规则列表
pub fn serialize_rules(rules: &[CssRule]) -> String {
    rules
        .iter()
        .map(serialize_rule)
        .collect::<Vec<_>>()
        .join("\n")
}

fn serialize_rule(rule: &CssRule) -> String {
    match rule {
        CssRule::Import(import) => format!("{};", import.source),
        CssRule::Group { prelude, rules } => {
            format!("{} {{\n{}\n}}", prelude, serialize_rules(rules))
        }
        CssRule::Style { prelude, body } => {
            let mut result = format!("{} {{", prelude);
            for item in body {
                result.push(' ');
                result.push_str(&serialize_block_item(item));
            }
            result.push_str(" }");
            result
        }
        CssRule::Statement(text) => format!("{};", text),
    }
}

fn serialize_block_item(item: &BlockItem) -> String {
    match item {
        BlockItem::Declaration(declaration) => {
            format!("{}: {};", declaration.name, declaration.value)
        }
        BlockItem::Rule(rule) => serialize_rule(rule),
    }
}

/// 序列化声明块（不带花括号），用于 `style` 属性
pub fn serialize_declarations(items: &[BlockItem]) -> String {
    items
        .iter()
        .map(serialize_block_item)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 声明值中第一个 `url()` 引用的字节范围与目标
struct UrlReference {
    start: usize,
    end: usize,
    href: String,
}

fn find_first_url(value: &str) -> Option<UrlReference> {
    let mut input = ParserInput::new(value);
    let mut parser = Parser::new(&mut input);

    first_url_in(&mut parser)
}

fn first_url_in(parser: &mut Parser) -> Option<UrlReference> {
    loop {
        let before = parser.position();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => return None,
        };

        match token {
            Token::UnquotedUrl(href) => {
                return Some(UrlReference {
                    start: before.byte_index(),
                    end: parser.position().byte_index(),
                    href: href.to_string(),
                });
            }
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let href = nested(parser, first_string);
                return Some(UrlReference {
                    start: before.byte_index(),
                    end: parser.position().byte_index(),
                    href,
                });
            }
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                if let Some(found) = nested(parser, first_url_in) {
                    return Some(found);
                }
            }
            _ => {}
        }
    }
}

/// 样式表重写器
///
/// 把规则树中的引用全部转换为捕获结果中的本地路径，并把 `@import` 原位展开。
///
/// 外链和导入的样式表中的 `url()` 与 `@import` 相对样式表自身的 URL 解析，与浏览器一致；
/// 只有内联样式和 `style` 属性相对文档基准 URI 解析。
pub struct CssRewriter<'a> {
    references: &'a ReferenceMapper<'a>,
    stylesheets: &'a dyn StylesheetSource,
}

impl<'a> CssRewriter<'a> {
    pub fn new(references: &'a ReferenceMapper<'a>, stylesheets: &'a dyn StylesheetSource) -> Self {
        Self {
            references,
            stylesheets,
        }
    }

    /// 重写整张样式表，`base` 为样式表自身的 URL（内联样式为文档基准 URI）
    ///
    /// # 错误
    ///
    /// 任一被导入的样式表无法获取时返回 `StylesheetFetch`
    pub fn rewrite_stylesheet(&self, css: &str, base: &Url) -> DumpResult<String> {
        let mut visiting = vec![sheet_key(base)];
        let rules = self.rewrite_rules(parse_stylesheet(css), base, &mut visiting)?;
        Ok(serialize_rules(&rules))
    }

    /// 重写 `url` 处的外链样式表
    pub fn rewrite_linked(&self, url: &Url) -> DumpResult<String> {
        let css = self.stylesheets.stylesheet(url)?;
        self.rewrite_stylesheet(css, url)
    }

    /// 重写 `style` 属性中的声明块
    pub fn rewrite_declaration_block(&self, block: &str, base: &Url) -> DumpResult<String> {
        let mut visiting = vec![sheet_key(base)];
        let items = self.rewrite_body(parse_declarations(block), base, &mut visiting)?;
        Ok(serialize_declarations(&items))
    }

    /// 重写声明值中的第一个 `url()`，其余 `url()` 保持不变
    pub fn rewrite_value(&self, value: &str, base: &Url) -> String {
        let Some(reference) = find_first_url(value) else {
            return value.to_string();
        };

        let replacement = match self.references.map(&reference.href, base) {
            LocalReference::Keep => return value.to_string(),
            LocalReference::Local(path) => path,
            LocalReference::Missing => String::new(),
        };

        format!(
            "{}url({}){}",
            &value[..reference.start],
            format_quoted_string(&replacement),
            &value[reference.end..]
        )
    }

    fn rewrite_rules(
        &self,
        rules: Vec<CssRule>,
        base: &Url,
        visiting: &mut Vec<String>,
    ) -> DumpResult<Vec<CssRule>> {
        let mut result = Vec::with_capacity(rules.len());

        for rule in rules {
            match rule {
                CssRule::Import(import) => {
                    result.extend(self.inline_import(&import, base, visiting)?);
                }
                CssRule::Group { prelude, rules } => {
                    let rules = self.rewrite_rules(rules, base, visiting)?;
                    result.push(CssRule::Group { prelude, rules });
                }
                CssRule::Style { prelude, body } => {
                    let body = self.rewrite_body(body, base, visiting)?;
                    result.push(CssRule::Style { prelude, body });
                }
                CssRule::Statement(text) => {
                    // 内联后的样式表随文档以 UTF-8 输出
                    if at_rule_name(&text).as_deref() != Some("charset") {
                        result.push(CssRule::Statement(text));
                    }
                }
            }
        }

        Ok(result)
    }

    fn rewrite_body(
        &self,
        body: Vec<BlockItem>,
        base: &Url,
        visiting: &mut Vec<String>,
    ) -> DumpResult<Vec<BlockItem>> {
        let mut result = Vec::with_capacity(body.len());

        for item in body {
            match item {
                BlockItem::Declaration(Declaration { name, value }) => {
                    result.push(BlockItem::Declaration(Declaration {
                        value: self.rewrite_value(&value, base),
                        name,
                    }));
                }
                BlockItem::Rule(rule) => result.extend(
                    self.rewrite_rules(vec![rule], base, visiting)?
                        .into_iter()
                        .map(BlockItem::Rule),
                ),
            }
        }

        Ok(result)
    }

    fn inline_import(
        &self,
        import: &ImportRule,
        base: &Url,
        visiting: &mut Vec<String>,
    ) -> DumpResult<Vec<CssRule>> {
        let Some(url) = resolve_url(base, &import.href) else {
            return Err(DumpError::stylesheet(
                import.href.as_str(),
                "unresolvable import",
            ));
        };

        let key = sheet_key(&url);
        if visiting.contains(&key) {
            warn!(url = %url, "cyclic @import dropped");
            return Ok(Vec::new());
        }

        let css = self.stylesheets.stylesheet(&url)?;
        visiting.push(key);
        let rules = self.rewrite_rules(parse_stylesheet(css), &url, visiting);
        visiting.pop();
        let mut rules = rules?;

        if !import.media.is_empty() {
            rules = vec![CssRule::Group {
                prelude: format!("@media {}", import.media),
                rules,
            }];
        }
        if let Some(condition) = &import.supports {
            rules = vec![CssRule::Group {
                prelude: format!("@supports ({})", condition),
                rules,
            }];
        }
        if let Some(layer) = &import.layer {
            let prelude = if layer.is_empty() {
                "@layer".to_string()
            } else {
                format!("@layer {}", layer)
            };
            rules = vec![CssRule::Group { prelude, rules }];
        }

        Ok(rules)
    }
}

/// 样式表身份：去掉片段的 URL
pub(crate) fn sheet_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_fragment(None);
    key.to_string()
}
