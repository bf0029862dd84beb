//! 运行时 fetch 重定向脚本
//!
//! 快照在本地打开时，页面脚本发起的 GET/HEAD 请求如果命中 IdentityMap，
//! 就被改写为对本地路径的请求；其余请求原样放行。脚本内容只取决于映射本身。

use serde_json::{Map, Value};

use crate::capture::store::IdentityMap;

/// 注入脚本元素的 id，重写时据此识别并移除旧的脚本
pub const SHIM_SCRIPT_ID: &str = "pagedump-shim";

const SHIM_TEMPLATE: &str = r#""use strict";
(() => {
const nativeFetch = window.fetch;
const pathMap = __PATH_MAP__;

window.fetch = (input, init) => {
	const request = new Request(input, init);
	switch (request.method) {
		case "GET":
		case "HEAD":
			break;
		default:
			return nativeFetch(request);
	}

	const url = new URL(request.url);
	switch (url.protocol) {
		case "http:":
		case "https:":
			break;
		default:
			return nativeFetch(request);
	}

	const local = pathMap[url.origin + url.pathname];
	if (local == null)
		return nativeFetch(request);
	return nativeFetch(local, { method: request.method, headers: request.headers });
};
})();"#;

/// 由 IdentityMap 生成脚本文本
///
/// 映射按键排序输出；`</` 被转义，脚本可以安全地放进 `<script>` 元素。
pub fn build_shim(identities: &IdentityMap) -> String {
    let map: Map<String, Value> = identities
        .iter()
        .map(|(identity, path)| (identity.clone(), Value::String(path.clone())))
        .collect();
    let json = format!("{:#}", Value::Object(map)).replace("</", "<\\/");

    SHIM_TEMPLATE.replace("__PATH_MAP__", &json)
}
