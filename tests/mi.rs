use mibridge::mi::{
    parse_cstring, parse_line, parse_line_bytes, parse_results, parse_value, quote_cstring,
    MiValue, RecordKind, StopReason, MAX_DEPTH,
};

#[test]
fn test_parse_line_never_panics_on_single_bytes() {
    for b in 0..=255u8 {
        _ = parse_line_bytes(&[b]);
        _ = parse_line(&char::from(b).to_string());
        for sigil in [b'^', b'*', b'+', b'=', b'~', b'@', b'&'] {
            _ = parse_line_bytes(&[sigil, b]);
            _ = parse_line_bytes(&[b'1', sigil, b',', b]);
        }
    }
}

#[test]
fn test_parse_line_never_panics_on_byte_pairs() {
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let pair = [a, b];
            _ = parse_line_bytes(&pair);
            let text = String::from_utf8_lossy(&pair);
            _ = parse_value(&text, 0);
            _ = parse_value(&text, 1);
            _ = parse_results(&text);
            _ = parse_cstring(&text);
        }
    }
}

#[test]
fn test_adversarial_lines() {
    let lines = [
        "^done,a={",
        "^done,a=[",
        "^done,a=\"",
        "^done,a=\"\\",
        "^done,=,=,=",
        "^done,}}}]]]",
        "^done,a={b=[c={d=\"x\"",
        "*stopped,reason=",
        "~",
        "~\"",
        "~\"\\",
        "^",
        "^,",
        "=,,,",
    ];
    for line in lines {
        let record = parse_line(line);
        assert!(record.is_some(), "line: {line}");
    }
    assert_eq!(parse_line("12"), None);
}

#[test]
fn test_deep_nesting_in_line() {
    let depth = 1000;
    let line = format!("^done,v={}\"x\"{}", "{a=".repeat(depth), "}".repeat(depth));
    let record = parse_line(&line).unwrap();

    let mut value = record.get("v").unwrap();
    let mut levels = 0;
    while let Some(inner) = value.get("a") {
        value = inner;
        levels += 1;
    }
    // containers below the depth limit stay raw text
    assert_eq!(levels, MAX_DEPTH);
    let rest = depth - MAX_DEPTH;
    assert_eq!(
        value.as_str(),
        Some(format!("{}\"x\"{}", "{a=".repeat(rest), "}".repeat(rest)).as_str())
    );

    let line = format!("^done,v={}", "[".repeat(depth));
    assert!(parse_line(&line).is_some());
}

#[test]
fn test_hostile_nesting_depth() {
    let depth = 100_000;
    let lines = [
        format!("^done,v={}", "[".repeat(depth)),
        format!("^done,v={}", "{a=".repeat(depth)),
        format!("^done,v={}{}", "[".repeat(depth), "]".repeat(depth)),
        format!("*stopped,frame={}\"x\"{}", "{a=".repeat(depth), "}".repeat(depth)),
    ];
    for line in lines {
        let record = parse_line(&line).unwrap();
        let copy = record.clone();
        assert_eq!(copy, record);

        let value = record.results().and_then(|r| r.values().next()).unwrap();
        let rendered = value.to_string();
        assert_eq!(&parse_value(&rendered, 0).0, value);
        assert!(serde_json::to_string(&record).is_ok());

        drop(copy);
        drop(record);
    }
}

#[test]
fn test_cstring_unknown_escape() {
    assert_eq!(parse_cstring("\"a\\qb\""), "aqb");
}

#[test]
fn test_results_last_key_wins() {
    let (results, _) = parse_results("a=\"1\",a=\"2\"");
    assert_eq!(results.len(), 1);
    assert_eq!(results["a"], MiValue::String("2".to_string()));
}

#[test]
fn test_megabyte_string_round_trip() {
    let chunk = "line \"quoted\"\twith \\ slash\n";
    let payload = chunk.repeat((1 << 20) / chunk.len() + 1);
    let line = format!("~{}", quote_cstring(&payload));

    let record = parse_line(&line).unwrap();
    assert_eq!(record.kind, RecordKind::StreamConsole);
    let output = record.raw_output().unwrap();
    assert_eq!(output.len(), payload.len());
    assert_eq!(output, payload);
}

#[test]
fn test_breakpoint_stop_record() {
    let line = r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",frame={addr="0x80000010",func="main",args=[],file="main.c",line="12"},thread-id="1",stopped-threads="all""#;
    let record = parse_line(line).unwrap();
    assert_eq!(record.stop_reason(), Some(StopReason::Breakpoint));
    assert_eq!(
        record.get("frame").and_then(|f| f.get("line")).and_then(MiValue::as_str),
        Some("12")
    );

    let rendered = record.get("frame").unwrap().to_string();
    assert_eq!(
        rendered,
        r#"{addr="0x80000010",func="main",args=[],file="main.c",line="12"}"#
    );
}

#[test]
fn test_result_record_with_token() {
    let record = parse_line(
        r#"7^done,bkpt={number="1",type="hw breakpoint",addr="0x80000010"},stack=[frame={level="0"},frame={level="1"}]"#,
    )
    .unwrap();
    assert_eq!(record.token, Some(7));
    assert_eq!(record.kind, RecordKind::ResultRecord);
    assert_eq!(record.class, "done");

    let stack = record.get("stack").and_then(MiValue::as_list).unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(
        stack[1]
            .get("frame")
            .and_then(|f| f.get("level"))
            .and_then(MiValue::as_str),
        Some("1")
    );
}
