use factstack_domain::{
	dictionary,
	language::{self, LanguageTag},
	text,
};

#[test]
fn zh_query_needs_translation_and_yields_english_terms() {
	let question = "服务重启后日志报错怎么排查？";
	let tag = language::detect(question);

	assert_eq!(tag, LanguageTag::Zh);
	assert!(language::needs_translation(tag, LanguageTag::En));

	let translated = dictionary::bundled().translate(question, LanguageTag::En);
	let terms = text::tokenize_terms(&translated.text);

	for expected in ["service", "restart", "log", "troubleshoot"] {
		assert!(terms.iter().any(|term| term == expected), "Missing {expected} in {terms:?}.");
	}
	// Characters without a dictionary entry pass through untouched.
	assert!(translated.text.contains("报错"));
}

#[test]
fn english_query_round_trips_through_reverse_dictionary() {
	let translated = dictionary::bundled().translate("restart the database", LanguageTag::Zh);

	assert_eq!(language::detect(&translated.text), LanguageTag::Zh);
	assert!(translated.text.contains("重启"));
	assert!(translated.text.contains("数据库"));
}

#[test]
fn hits_serialize_as_objects() {
	let translated = dictionary::bundled().translate("回滚", LanguageTag::En);
	let value = serde_json::to_value(&translated.hits).expect("Failed to serialize hits.");

	assert_eq!(value[0]["term"], "回滚");
	assert_eq!(value[0]["translation"], "rollback");
}
