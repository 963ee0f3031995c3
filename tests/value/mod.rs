// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg(test)]

use monty::Value;

#[test]
fn json_exchange_round_trip() {
    let v = Value::from_json_str(r#"{"name": "x", "items": [1, 2.5, null, true]}"#).unwrap();
    assert_eq!(v.repr_str(), "{'name': 'x', 'items': [1, 2.5, None, True]}");
    assert_eq!(
        v.to_json_str().unwrap(),
        r#"{"name":"x","items":[1,2.5,null,true]}"#
    );
}

#[test]
fn from_conversions() {
    assert_eq!(Value::from(3i64), Value::Int(3));
    assert_eq!(Value::from(true), Value::Bool(true));
    assert_eq!(Value::from("s").repr_str(), "'s'");
    assert_eq!(
        Value::from(vec![Value::Int(1), Value::Int(2)]).repr_str(),
        "[1, 2]"
    );
}

#[test]
fn structural_equality_crosses_container_kinds() {
    let a = Value::from_json_str("[1, [2, 3]]").unwrap();
    let b = Value::from_json_str("[1, [2, 3]]").unwrap();
    let c = Value::from_json_str("[1, [2, 4]]").unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn numeric_tower_in_host_values() {
    assert_eq!(Value::Int(1), Value::Float(1.0));
    assert_eq!(Value::Bool(true), Value::Int(1));
    assert_ne!(Value::Int(1), Value::from("1"));
}

#[test]
fn exotic_values_serialize_as_repr_strings() {
    let v = Value::new_tuple(vec![Value::Int(1)]);
    assert_eq!(v.to_json_str().unwrap(), "[1]");
    let none = Value::None;
    assert_eq!(none.to_json_str().unwrap(), "null");
}
