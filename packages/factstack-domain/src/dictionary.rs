//! Bundled bidirectional dictionary of operations vocabulary used by `rule` translation.

use std::{
	collections::{HashMap, HashSet},
	sync::OnceLock,
};

use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

use crate::language::{LanguageTag, is_cjk_word_char};

const ZH_EN_ENTRIES: &[(&str, &str)] = &[
	("如何", "how to"),
	("怎么", "how to"),
	("什么", "what"),
	("为什么", "why"),
	("哪里", "where"),
	("回滚", "rollback"),
	("部署", "deploy deployment"),
	("服务", "service"),
	("配置", "configure configuration"),
	("问题", "issue problem"),
	("错误", "error"),
	("故障", "failure fault"),
	("排查", "troubleshoot debug"),
	("调试", "debug"),
	("日志", "log logs"),
	("查看", "view check"),
	("检查", "check verify"),
	("重启", "restart"),
	("启动", "start"),
	("停止", "stop"),
	("连接", "connection connect"),
	("数据库", "database"),
	("内存", "memory"),
	("网络", "network"),
	("延迟", "latency delay"),
	("性能", "performance"),
	("监控", "monitoring monitor"),
	("告警", "alert alarm"),
	("事件", "incident event"),
	("响应", "response"),
	("处理", "handle process"),
	("容器", "container"),
	("集群", "cluster"),
	("节点", "node"),
	("状态", "status state"),
	("健康", "health healthy"),
	("探针", "probe"),
	("流量", "traffic"),
	("负载", "load"),
	("均衡", "balance balancer"),
	("扩容", "scale scaling"),
	("缩容", "scale down"),
	("发布", "release publish"),
	("版本", "version"),
	("更新", "update"),
	("升级", "upgrade"),
	("降级", "downgrade"),
	("镜像", "image"),
	("拉取", "pull"),
	("推送", "push"),
	("命令", "command"),
	("执行", "execute run"),
	("步骤", "step steps procedure"),
	("设置", "setting settings"),
	("参数", "parameter"),
	("阈值", "threshold"),
	("超时", "timeout"),
	("重试", "retry"),
	("池", "pool"),
	("泄漏", "leak"),
	("溢出", "overflow"),
	("崩溃", "crash"),
	("挂起", "hang"),
	("死锁", "deadlock"),
	("队列", "queue"),
	("缓存", "cache"),
	("清理", "clean clear"),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DictionaryHit {
	pub term: String,
	pub translation: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleTranslation {
	/// Translated keywords, or the input text unchanged when nothing matched.
	pub text: String,
	pub hits: Vec<DictionaryHit>,
}

#[derive(Debug)]
pub struct Dictionary {
	zh_en: HashMap<&'static str, &'static str>,
	en_zh: HashMap<&'static str, &'static str>,
	max_term_chars: usize,
}
impl Dictionary {
	fn from_entries(entries: &'static [(&'static str, &'static str)]) -> Self {
		let mut zh_en = HashMap::with_capacity(entries.len());
		let mut en_zh = HashMap::new();
		let mut max_term_chars = 1;

		for (zh, en) in entries {
			zh_en.insert(*zh, *en);

			max_term_chars = max_term_chars.max(zh.chars().count());

			for word in en.split_whitespace() {
				en_zh.entry(word).or_insert(*zh);
			}
		}

		Self { zh_en, en_zh, max_term_chars }
	}

	pub fn len(&self) -> usize {
		self.zh_en.len()
	}

	pub fn is_empty(&self) -> bool {
		self.zh_en.is_empty()
	}

	pub fn lookup_zh(&self, term: &str) -> Option<&'static str> {
		self.zh_en.get(term).copied()
	}

	pub fn lookup_en(&self, word: &str) -> Option<&'static str> {
		self.en_zh.get(word.to_ascii_lowercase().as_str()).copied()
	}

	/// Translates `text` toward `target` (`en` or `zh`). Other targets return the input unchanged.
	pub fn translate(&self, text: &str, target: LanguageTag) -> RuleTranslation {
		let normalized: String = text.nfkc().collect();
		let (tokens, hits) = match target {
			LanguageTag::En => self.to_english(normalized.as_str()),
			LanguageTag::Zh => self.to_chinese(normalized.as_str()),
			LanguageTag::Mixed | LanguageTag::Other => (Vec::new(), Vec::new()),
		};

		if hits.is_empty() {
			return RuleTranslation { text: text.trim().to_string(), hits };
		}

		RuleTranslation { text: join_unique(tokens), hits }
	}

	fn to_english(&self, text: &str) -> (Vec<String>, Vec<DictionaryHit>) {
		let mut tokens = Vec::new();
		let mut hits = Vec::new();
		let mut word = String::new();
		let mut run = Vec::new();

		for ch in text.chars() {
			if is_cjk_word_char(ch) {
				flush_word(&mut word, &mut tokens);
				run.push(ch);
			} else if ch.is_alphanumeric() {
				self.flush_run(&mut run, &mut tokens, &mut hits);
				word.push(ch);
			} else {
				flush_word(&mut word, &mut tokens);
				self.flush_run(&mut run, &mut tokens, &mut hits);
			}
		}

		flush_word(&mut word, &mut tokens);
		self.flush_run(&mut run, &mut tokens, &mut hits);

		(tokens, hits)
	}

	// Greedy longest match over one run of CJK characters.
	fn flush_run(&self, run: &mut Vec<char>, tokens: &mut Vec<String>, hits: &mut Vec<DictionaryHit>) {
		let mut unmatched = String::new();
		let mut start = 0;

		while start < run.len() {
			let longest = self.max_term_chars.min(run.len() - start);
			let mut matched = false;

			for len in (1..=longest).rev() {
				let term: String = run[start..start + len].iter().collect();

				if let Some(translation) = self.lookup_zh(term.as_str()) {
					flush_word(&mut unmatched, tokens);
					tokens.push(translation.to_string());
					hits.push(DictionaryHit { term, translation: translation.to_string() });

					start += len;
					matched = true;

					break;
				}
			}

			if !matched {
				unmatched.push(run[start]);

				start += 1;
			}
		}

		flush_word(&mut unmatched, tokens);
		run.clear();
	}

	fn to_chinese(&self, text: &str) -> (Vec<String>, Vec<DictionaryHit>) {
		let mut tokens = Vec::new();
		let mut hits = Vec::new();

		for raw in text.split(|ch: char| !ch.is_alphanumeric()) {
			if raw.is_empty() {
				continue;
			}

			match self.lookup_en(raw) {
				Some(term) => {
					tokens.push(term.to_string());
					hits.push(DictionaryHit {
						term: raw.to_ascii_lowercase(),
						translation: term.to_string(),
					});
				},
				None => tokens.push(raw.to_string()),
			}
		}

		(tokens, hits)
	}
}

pub fn bundled() -> &'static Dictionary {
	static DICTIONARY: OnceLock<Dictionary> = OnceLock::new();

	DICTIONARY.get_or_init(|| Dictionary::from_entries(ZH_EN_ENTRIES))
}

fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
	if !word.is_empty() {
		tokens.push(std::mem::take(word));
	}
}

fn join_unique(tokens: Vec<String>) -> String {
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for token in &tokens {
		for word in token.split_whitespace() {
			if seen.insert(word) {
				out.push(word);
			}
		}
	}

	out.join(" ")
}

#[cfg(test)]
mod tests {
	use super::bundled;
	use crate::language::LanguageTag;

	#[test]
	fn rollback_question_translates_to_keywords() {
		let out = bundled().translate("如何回滚部署？", LanguageTag::En);

		assert_eq!(out.text, "how to rollback deploy deployment");
		assert_eq!(out.hits.len(), 3);
		assert_eq!(out.hits[1].term, "回滚");
	}

	#[test]
	fn longest_term_wins() {
		let out = bundled().translate("为什么数据库超时", LanguageTag::En);

		assert_eq!(out.text, "why database timeout");
		assert_eq!(out.hits[0].term, "为什么");
	}

	#[test]
	fn ascii_words_and_unmatched_characters_pass_through() {
		let out = bundled().translate("k8s 集群的节点", LanguageTag::En);

		assert_eq!(out.text, "k8s cluster 的 node");
	}

	#[test]
	fn no_hits_returns_original_text() {
		let out = bundled().translate(" 你好世界 ", LanguageTag::En);

		assert_eq!(out.text, "你好世界");
		assert!(out.hits.is_empty());
	}

	#[test]
	fn reverse_direction_maps_english_words() {
		let out = bundled().translate("Rollback the deployment", LanguageTag::Zh);

		assert_eq!(out.text, "回滚 the 部署");
		assert_eq!(out.hits.len(), 2);
	}

	#[test]
	fn dictionary_is_not_empty() {
		assert!(!bundled().is_empty());
		assert_eq!(bundled().lookup_en("ROLLBACK"), Some("回滚"));
	}
}
