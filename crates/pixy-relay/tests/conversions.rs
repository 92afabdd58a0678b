use std::collections::{BTreeMap, HashSet};

use pixy_relay::protocol::chat::{ChatCompletion, ChatCompletionChunk};
use pixy_relay::protocol::messages::{ContentBlock, MessageStreamEvent, StopReason};
use pixy_relay::protocol::responses::{OutputItem, ResponseStatus, ResponseStreamEvent};
use pixy_relay::{
    chat_completion_to_response, collect_events, decode_message_event, harmony_to_response,
    messages_to_response, parse_sse_frames, replay_message_events, replay_response_events,
    response_to_message_events, response_to_messages, same_ignoring_prefix, to_call_id,
    to_tool_use_id, translate_id, ChatToResponsesAdapter, HarmonyToResponsesAdapter, IdPrefix,
    MessagesToResponsesAdapter, ResponsesToMessagesAdapter,
};
use serde_json::json;

fn chunk(value: serde_json::Value) -> ChatCompletionChunk {
    serde_json::from_value(value).expect("valid chunk")
}

fn text_chunk(text: &str) -> ChatCompletionChunk {
    chunk(json!({
        "id": "chatcmpl_abc",
        "model": "gpt-test",
        "created": 10,
        "choices": [{ "index": 0, "delta": { "content": text } }]
    }))
}

fn finish_chunk(reason: &str) -> ChatCompletionChunk {
    chunk(json!({
        "id": "chatcmpl_abc",
        "model": "gpt-test",
        "created": 10,
        "choices": [{ "index": 0, "delta": {}, "finish_reason": reason }]
    }))
}

fn tool_chunk() -> ChatCompletionChunk {
    chunk(json!({
        "id": "chatcmpl_abc",
        "model": "gpt-test",
        "created": 10,
        "choices": [{ "index": 0, "delta": { "tool_calls": [{
            "index": 0,
            "id": "c1",
            "type": "function",
            "function": { "name": "get_weather", "arguments": "{}" }
        }] } }]
    }))
}

fn event_types(events: &[ResponseStreamEvent]) -> Vec<&'static str> {
    events.iter().map(ResponseStreamEvent::event_type).collect()
}

fn terminal(events: &[ResponseStreamEvent]) -> &pixy_relay::protocol::responses::ResponseObject {
    events
        .last()
        .and_then(ResponseStreamEvent::terminal_response)
        .expect("stream ends with a terminal response")
}

fn assert_item_symmetry(events: &[ResponseStreamEvent]) {
    let mut added = HashSet::new();
    let mut done = HashSet::new();
    for (position, event) in events.iter().enumerate() {
        match event {
            ResponseStreamEvent::OutputItemAdded { output_index, .. } => {
                assert!(added.insert(*output_index), "index {output_index} added twice");
            }
            ResponseStreamEvent::OutputItemDone { output_index, .. } => {
                assert!(added.contains(output_index), "index {output_index} done before added");
                assert!(done.insert(*output_index), "index {output_index} done twice");
            }
            ResponseStreamEvent::Completed { .. } => {
                assert_eq!(position, events.len() - 1, "completed must be last");
            }
            _ => {}
        }
    }
    assert_eq!(added, done);
}

fn assert_block_symmetry(events: &[MessageStreamEvent]) {
    let mut started = HashSet::new();
    let mut stopped = HashSet::new();
    let mut saw_stop = false;
    for event in events {
        assert!(!saw_stop, "no events after message_stop");
        match event {
            MessageStreamEvent::ContentBlockStart { index, .. } => {
                assert!(started.insert(*index));
            }
            MessageStreamEvent::ContentBlockStop { index } => {
                assert!(started.contains(index));
                assert!(stopped.insert(*index));
            }
            MessageStreamEvent::MessageStop => saw_stop = true,
            _ => {}
        }
    }
    assert!(saw_stop);
    assert_eq!(started, stopped);
}

#[test]
fn simple_text_stream_produces_expected_item_events() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![text_chunk("Hel"), text_chunk("lo"), finish_chunk("stop")],
    );

    assert_eq!(
        event_types(&events),
        vec![
            "response.created",
            "response.output_item.added",
            "response.output_text.delta",
            "response.output_text.delta",
            "response.output_text.done",
            "response.output_item.done",
            "response.completed",
        ]
    );
    let deltas = events
        .iter()
        .filter_map(|event| match event {
            ResponseStreamEvent::OutputTextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(deltas, vec!["Hel", "lo"]);
    assert!(events.iter().any(|event| matches!(
        event,
        ResponseStreamEvent::OutputTextDone { text, .. } if text == "Hello"
    )));

    let response = terminal(&events);
    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.output_text.as_deref(), Some("Hello"));
    assert_eq!(response.id, "resp_abc");
}

#[test]
fn single_tool_call_stream_produces_function_call_item() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![tool_chunk(), finish_chunk("tool_calls")],
    );

    assert_eq!(
        event_types(&events),
        vec![
            "response.created",
            "response.output_item.added",
            "response.function_call_arguments.delta",
            "response.function_call_arguments.done",
            "response.output_item.done",
            "response.completed",
        ]
    );
    let ResponseStreamEvent::OutputItemAdded { item, .. } = &events[1] else {
        panic!("expected output_item.added");
    };
    assert!(matches!(
        item,
        OutputItem::FunctionCall { call_id, name, .. } if call_id == "c1" && name == "get_weather"
    ));

    let response = terminal(&events);
    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(
        response.function_calls().collect::<Vec<_>>(),
        vec![("c1", "get_weather", "{}")]
    );
}

#[test]
fn length_cutoff_completes_as_incomplete() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![text_chunk("partial"), finish_chunk("length")],
    );
    let response = terminal(&events);
    assert_eq!(events.last().map(ResponseStreamEvent::event_type), Some("response.completed"));
    assert_eq!(response.status, ResponseStatus::Incomplete);
    assert_eq!(
        response
            .incomplete_details
            .as_ref()
            .map(|details| details.reason.as_str()),
        Some("max_output_tokens")
    );

    let message_events = response_to_message_events(response);
    let message = replay_message_events(&message_events);
    assert_eq!(message.stop_reason, Some(StopReason::MaxTokens));
}

const HARMONY_TOOL_CALL: &str = "<|start|>assistant<|channel|>final<|call|>functions.get_weather \
    {\"location\":\"SF\"}<|message|>I'll check.<|end|>";

#[test]
fn harmony_tool_call_yields_call_and_final_message() {
    let response = harmony_to_response(HARMONY_TOOL_CALL, "gpt-oss");
    let calls = response.function_calls().collect::<Vec<_>>();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, "get_weather");
    assert_eq!(calls[0].2, "{\"location\":\"SF\"}");
    assert_eq!(response.output_text.as_deref(), Some("I'll check."));

    let streamed = collect_events(
        HarmonyToResponsesAdapter::new("gpt-oss"),
        HARMONY_TOOL_CALL
            .as_bytes()
            .chunks(7)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned()),
    );
    assert_item_symmetry(&streamed);
    let streamed_response = terminal(&streamed);
    let streamed_calls = streamed_response.function_calls().collect::<Vec<_>>();
    assert_eq!(streamed_calls.len(), 1);
    assert_eq!(streamed_calls[0].1, "get_weather");
    assert_eq!(streamed_calls[0].2, "{\"location\":\"SF\"}");
    assert_eq!(streamed_response.output_text.as_deref(), Some("I'll check."));
}

const HARMONY_RETURN_RECIPIENT: &str = "<|start|>assistant<|channel|>commentary<|return|>\
    functions.lookup {\"a\":1}<|message|>done<|end|>";

#[test]
fn header_return_recipient_survives_chunked_streaming() {
    let direct = harmony_to_response(HARMONY_RETURN_RECIPIENT, "gpt-oss");
    let streamed = collect_events(
        HarmonyToResponsesAdapter::new("gpt-oss"),
        HARMONY_RETURN_RECIPIENT
            .as_bytes()
            .chunks(5)
            .map(|chunk| String::from_utf8_lossy(chunk).into_owned()),
    );
    assert_item_symmetry(&streamed);
    let streamed = terminal(&streamed);

    for response in [&direct, streamed] {
        assert_eq!(response.output.len(), 2);
        let calls = response.function_calls().collect::<Vec<_>>();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, "lookup");
        assert_eq!(calls[0].2, "{\"a\":1}");
        assert_eq!(response.output_text.as_deref(), Some("done"));
    }
}

#[test]
fn every_item_is_added_and_done_exactly_once() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![
            chunk(json!({
                "id": "chatcmpl_abc",
                "choices": [{ "index": 0, "delta": { "reasoning_content": "thinking" } }]
            })),
            text_chunk("answer"),
            tool_chunk(),
            finish_chunk("tool_calls"),
        ],
    );
    assert_item_symmetry(&events);
    assert_eq!(terminal(&events).output.len(), 3);

    let message_events = collect_events(ResponsesToMessagesAdapter::new(), events);
    assert_block_symmetry(&message_events);
}

#[test]
fn final_item_content_is_the_concatenation_of_its_deltas() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![
            text_chunk("a"),
            text_chunk(""),
            text_chunk("bc"),
            chunk(json!({ "id": "chatcmpl_abc", "choices": [{ "index": 0, "delta": { "tool_calls": [
                { "index": 0, "id": "c9", "function": { "name": "sum", "arguments": "{\"a\":" } }
            ] } }] })),
            chunk(json!({ "id": "chatcmpl_abc", "choices": [{ "index": 0, "delta": { "tool_calls": [
                { "index": 0, "function": { "arguments": "1}" } }
            ] } }] })),
            finish_chunk("tool_calls"),
        ],
    );

    let mut streamed = BTreeMap::<usize, String>::new();
    let mut finals = BTreeMap::<usize, String>::new();
    for event in &events {
        match event {
            ResponseStreamEvent::OutputTextDelta {
                output_index,
                delta,
                ..
            }
            | ResponseStreamEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
                ..
            } => streamed.entry(*output_index).or_default().push_str(delta),
            ResponseStreamEvent::OutputTextDone {
                output_index, text, ..
            } => {
                finals.insert(*output_index, text.clone());
            }
            ResponseStreamEvent::FunctionCallArgumentsDone {
                output_index,
                arguments,
                ..
            } => {
                finals.insert(*output_index, arguments.clone());
            }
            _ => {}
        }
    }
    assert_eq!(streamed, finals);
    assert_eq!(finals.get(&0).map(String::as_str), Some("abc"));
    assert_eq!(finals.get(&1).map(String::as_str), Some("{\"a\":1}"));
}

#[test]
fn replayed_chat_stream_matches_direct_conversion() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![
            text_chunk("Hel"),
            text_chunk("lo"),
            tool_chunk(),
            finish_chunk("tool_calls"),
        ],
    );
    let replayed = replay_response_events(&events);

    let completion: ChatCompletion = serde_json::from_value(json!({
        "id": "chatcmpl_abc",
        "model": "gpt-test",
        "created": 10,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": "Hello",
                "tool_calls": [{
                    "id": "c1",
                    "type": "function",
                    "function": { "name": "get_weather", "arguments": "{}" }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    }))
    .expect("valid completion");
    let direct = chat_completion_to_response(&completion, None);

    assert_eq!(replayed.collect_output_text(), direct.collect_output_text());
    assert_eq!(
        replayed.function_calls().collect::<Vec<_>>(),
        direct.function_calls().collect::<Vec<_>>()
    );
    assert_eq!(replayed.status, direct.status);
    assert_eq!(replayed.id, direct.id);
}

#[test]
fn replayed_message_stream_matches_direct_conversion() {
    let events = collect_events(
        ChatToResponsesAdapter::new(),
        vec![text_chunk("Checking."), tool_chunk(), finish_chunk("tool_calls")],
    );
    let response = terminal(&events).clone();

    let streamed =
        replay_message_events(&collect_events(ResponsesToMessagesAdapter::new(), events));
    let direct = response_to_messages(&response);

    assert_eq!(streamed.text(), direct.text());
    assert_eq!(streamed.stop_reason, Some(StopReason::ToolUse));
    assert_eq!(streamed.stop_reason, direct.stop_reason);
    let tool_inputs = |blocks: &[ContentBlock]| {
        blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.clone(), name.clone(), input.clone()))
                }
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(tool_inputs(&streamed.content), tool_inputs(&direct.content));
    assert_eq!(
        tool_inputs(&direct.content),
        vec![("toolu_c1".to_string(), "get_weather".to_string(), json!({}))]
    );
}

#[test]
fn message_sse_capture_round_trips_through_item_events() {
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_42\",\"type\":\"message\",\
            \"role\":\"assistant\",\"model\":\"claude\",\"content\":[],\
            \"usage\":{\"input_tokens\":5,\"output_tokens\":0}}}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\
            \"text\":\"\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\
            \"text\":\"Hi \"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\
            \"text\":\"there\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "event: content_block_start\n",
        "data: {\"type\":\"content_block_start\",\"index\":1,\
            \"content_block\":{\"type\":\"tool_use\",\"id\":\"toolu_7\",\"name\":\"lookup\",\
            \"input\":{}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"index\":1,\
            \"delta\":{\"type\":\"input_json_delta\",\
            \"partial_json\":\"{\\\"q\\\":\\\"x\\\"}\"}}\n\n",
        "event: content_block_stop\n",
        "data: {\"type\":\"content_block_stop\",\"index\":1}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"tool_use\"},\
            \"usage\":{\"output_tokens\":9}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );
    let source = parse_sse_frames(body)
        .into_iter()
        .filter_map(|frame| decode_message_event(&frame.data).expect("valid event"))
        .collect::<Vec<_>>();
    let original = replay_message_events(&source);

    let item_events = collect_events(MessagesToResponsesAdapter::new(), source);
    assert_item_symmetry(&item_events);
    let response = terminal(&item_events);
    assert_eq!(response.id, "resp_42");
    assert_eq!(
        response.function_calls().collect::<Vec<_>>(),
        vec![("call_7", "lookup", "{\"q\":\"x\"}")]
    );
    assert_eq!(response.usage.as_ref().map(|usage| usage.total_tokens), Some(14));
    assert_eq!(messages_to_response(&original, None).collect_output_text(), "Hi there");

    let back =
        replay_message_events(&collect_events(ResponsesToMessagesAdapter::new(), item_events));
    assert_eq!(back.text(), original.text());
    assert!(back.content.iter().any(|block| matches!(
        block,
        ContentBlock::ToolUse { id, input, .. } if id == "toolu_7" && *input == json!({ "q": "x" })
    )));
}

#[test]
fn identifiers_round_trip_between_prefixes() {
    for id in ["toolu_01ABC", "toolu_", "call_xyz", "c1", "fc_9"] {
        let forward = to_call_id(id);
        assert!(same_ignoring_prefix(id, &forward));
        if id.starts_with("toolu_") {
            assert_eq!(to_tool_use_id(&forward), id);
        }
    }
    assert_eq!(translate_id("chatcmpl_abc", IdPrefix::Response), "resp_abc");
    assert_eq!(
        translate_id(&translate_id("msg_1", IdPrefix::Response), IdPrefix::Message),
        "msg_1"
    );
}
