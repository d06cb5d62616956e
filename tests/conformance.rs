//! Conformance: every supported program must print the same bytes in
//! interpreted and compiled execution.

use tsar_lang::runtime::ExecMode;
use tsar_lang::run_source_to_string;

/// Run `source` in both modes, assert byte-for-byte equal stdout, and
/// return it.
fn both(source: &str) -> String {
    let interpreted = run_source_to_string(source, ExecMode::Interpret)
        .unwrap_or_else(|e| panic!("interpreter failed: {e}\n{source}"));
    let compiled = run_source_to_string(source, ExecMode::Compile)
        .unwrap_or_else(|e| panic!("compiler failed: {e}\n{source}"));
    assert_eq!(interpreted, compiled, "modes diverged for:\n{source}");
    interpreted
}

/// Run `source` in both modes and assert both abort with a message
/// containing every expected fragment.
fn both_fail(source: &str, fragments: &[&str]) {
    for mode in [ExecMode::Interpret, ExecMode::Compile] {
        let error = run_source_to_string(source, mode)
            .expect_err(&format!("expected a failure for:\n{source}"));
        for fragment in fragments {
            assert!(
                error.message.contains(fragment),
                "expected '{fragment}' in '{}'",
                error.message
            );
        }
    }
}

#[test]
fn arithmetic_and_declarations() {
    assert_eq!(both("let x: number = 10 + 5; console.log(x);"), "15\n");
}

#[test]
fn number_formatting() {
    assert_eq!(
        both("console.log(1.5); console.log(2); console.log(0.25 + 0.25);"),
        "1.5\n2\n0.5\n"
    );
}

#[test]
fn string_conversions_of_primitives() {
    assert_eq!(
        both("console.log(null); console.log(undefined); console.log(true); console.log(false);"),
        "null\nundefined\ntrue\nfalse\n"
    );
}

#[test]
fn arrays_print_comma_joined() {
    assert_eq!(both("console.log([1, 2, 3]);"), "1,2,3\n");
}

#[test]
fn symbols_print_their_description() {
    assert_eq!(
        both("console.log(Symbol(\"tag\")); console.log(Symbol());"),
        "Symbol(tag)\nSymbol()\n"
    );
}

#[test]
fn string_slice_boundaries() {
    assert_eq!(
        both(r#"console.log("hello".slice(-3)); console.log("hello".slice(10));"#),
        "llo\n\n"
    );
}

#[test]
fn string_char_access_boundaries() {
    assert_eq!(
        both(
            r#"console.log("hello".charCodeAt(10));
console.log("hello".at(-1));
console.log("hello".at(10));"#
        ),
        "NaN\no\nnull\n"
    );
}

#[test]
fn string_pad_and_case() {
    assert_eq!(
        both(r#"console.log("7".padStart(3, "0")); console.log("ab".toUpperCase());"#),
        "007\nAB\n"
    );
}

#[test]
fn math_min_max_of_nothing() {
    assert_eq!(
        both("console.log(Math.min()); console.log(Math.max());"),
        "Infinity\n-Infinity\n"
    );
}

#[test]
fn loose_and_strict_equality() {
    assert_eq!(
        both(
            "console.log(undefined == null);
console.log(undefined === null);
console.log(undefined == 0);"
        ),
        "true\nfalse\nfalse\n"
    );
}

#[test]
fn symbols_are_identity_only() {
    assert_eq!(
        both(
            r#"console.log(Symbol("d") === Symbol("d"));
console.log(Symbol.iterator === Symbol.iterator);"#
        ),
        "false\ntrue\n"
    );
}

#[test]
fn template_literals_interpolate() {
    assert_eq!(
        both(r#"const who: string = "world"; console.log(`hello ${who}${"!"}`);"#),
        "hello world!\n"
    );
}

#[test]
fn closures_capture_their_environment() {
    assert_eq!(
        both(
            "function counter(): any {
  let count: number = 0;
  return () => {
    count = count + 1;
    return count;
  };
}
const tick = counter();
tick();
console.log(tick());"
        ),
        "2\n"
    );
}

#[test]
fn named_function_expression_binds_its_own_name() {
    assert_eq!(
        both(
            "const fact = function go(n: number): number {
  return n <= 1 ? 1 : n * go(n - 1);
};
console.log(fact(5));"
        ),
        "120\n"
    );
}

#[test]
fn control_flow_loops_and_switch() {
    assert_eq!(
        both(
            "let total: number = 0;
for (let i = 0; i < 5; i = i + 1) {
  if (i == 2) {
    continue;
  }
  total = total + i;
}
while (total < 10) {
  total = total + 1;
}
switch (total) {
  case 9:
    console.log(\"nine\");
    break;
  case 10:
    console.log(\"ten\");
  default:
    console.log(\"done\");
}"
        ),
        "ten\ndone\n"
    );
}

#[test]
fn for_of_and_for_in() {
    assert_eq!(
        both(
            "for (const n of [10, 20]) {
  console.log(n);
}
const obj: any = { a: 1, b: 2 };
for (const key in obj) {
  console.log(key);
}"
        ),
        "10\n20\na\nb\n"
    );
}

#[test]
fn destructuring_with_holes_defaults_and_rest() {
    assert_eq!(
        both(
            "let [first, , third] = [1, 2, 3];
let { a, b = 5 } = { a: 7 };
let [head, ...tail] = [1, 2, 3, 4];
console.log(first);
console.log(third);
console.log(a);
console.log(b);
console.log(tail.length);"
        ),
        "1\n3\n7\n5\n3\n"
    );
}

#[test]
fn spread_in_calls_and_arrays() {
    assert_eq!(
        both(
            "function sum(...parts: number[]): number {
  let total: number = 0;
  for (const part of parts) {
    total = total + part;
  }
  return total;
}
const wide = [1, ...[2, 3], 4];
console.log(sum(...wide));"
        ),
        "10\n"
    );
}

#[test]
fn try_catch_finally_ordering() {
    assert_eq!(
        both(
            "function risky(): number {
  try {
    throw new RangeError(\"out of range\");
  } catch (e) {
    console.log(e.message);
    return 1;
  } finally {
    console.log(\"cleanup\");
  }
}
console.log(risky());"
        ),
        "out of range\ncleanup\n1\n"
    );
}

#[test]
fn error_hierarchy_and_instanceof() {
    assert_eq!(
        both(
            "try {
  throw new TypeError(\"boom\");
} catch (e) {
  console.log(e instanceof TypeError);
  console.log(e instanceof Error);
  console.log(e instanceof RangeError);
  console.log(e.name);
  console.log(e.toString());
}"
        ),
        "true\ntrue\nfalse\nTypeError\nTypeError: boom\n"
    );
}

#[test]
fn error_without_new_and_mutable_fields() {
    assert_eq!(
        both(
            "const e: any = Error(\"msg\");
console.log(e.toString());
e.message = \"\";
console.log(e.toString());
e.name = \"Custom\";
console.log(e.name);"
        ),
        "Error: msg\nError\nCustom\n"
    );
}

#[test]
fn classes_inheritance_and_super() {
    assert_eq!(
        both(
            "class Animal {
  name: string;
  constructor(name: string) {
    this.name = name;
  }
  speak(): string {
    return this.name + \" makes a sound\";
  }
}
class Dog extends Animal {
  constructor(name: string) {
    super(name);
  }
  override speak(): string {
    return super.speak() + \"; barks\";
  }
}
console.log(new Dog(\"Rex\").speak());"
        ),
        "Rex makes a sound; barks\n"
    );
}

#[test]
fn class_getters_setters_and_statics() {
    assert_eq!(
        both(
            "class Thermometer {
  private celsius: number = 0;
  static unit: string = \"C\";
  get value(): number {
    return this.celsius;
  }
  set value(next: number) {
    this.celsius = next;
  }
  static describe(): string {
    return \"degrees \" + Thermometer.unit;
  }
}
const t = new Thermometer();
t.value = 21;
console.log(t.value);
console.log(Thermometer.describe());"
        ),
        "21\ndegrees C\n"
    );
}

#[test]
fn static_blocks_run_in_declaration_order() {
    assert_eq!(
        both(
            "class Config {
  static table: any = {};
  static {
    Config.table.mode = \"fast\";
  }
}
console.log(Config.table.mode);"
        ),
        "fast\n"
    );
}

#[test]
fn generics_flow_through_functions_and_classes() {
    assert_eq!(
        both(
            "function identity<T>(value: T): T {
  return value;
}
class Box<T> {
  value: T;
  constructor(value: T) {
    this.value = value;
  }
  get(): T {
    return this.value;
  }
}
console.log(identity<number>(41) + 1);
console.log(new Box(\"inside\").get());"
        ),
        "42\ninside\n"
    );
}

#[test]
fn frozen_object_write_aborts_in_strict_mode() {
    both_fail(
        "\"use strict\";
const obj = Object.freeze({ x: 1 });
obj.x = 2;",
        &["TypeError", "Cannot assign to read only property"],
    );
}

#[test]
fn frozen_write_is_silent_in_sloppy_mode() {
    assert_eq!(
        both(
            "const obj = Object.freeze({ x: 1 });
obj.x = 2;
console.log(obj.x);
console.log(Object.isFrozen(Object.freeze(obj)));"
        ),
        "1\ntrue\n"
    );
}

#[test]
fn sealed_object_add_aborts_in_strict_mode() {
    both_fail(
        "\"use strict\";
const obj: any = Object.seal({ x: 1 });
obj.y = 2;",
        &["TypeError", "Cannot add property"],
    );
}

#[test]
fn sealed_object_allows_writes_to_existing() {
    assert_eq!(
        both(
            "\"use strict\";
const obj = Object.seal({ x: 1 });
obj.x = 5;
console.log(obj.x);"
        ),
        "5\n"
    );
}

#[test]
fn getter_only_write_mentions_getter_in_strict_mode() {
    both_fail(
        "\"use strict\";
const obj: any = { get x(): number { return 1; } };
obj.x = 2;",
        &["TypeError", "getter"],
    );
}

#[test]
fn delete_on_frozen_property() {
    both_fail(
        "\"use strict\";
const obj: any = Object.freeze({ x: 1 });
delete obj.x;",
        &["TypeError", "Cannot delete property"],
    );
    assert_eq!(
        both(
            "const obj: any = Object.freeze({ x: 1 });
console.log(delete obj.x);
const open: any = { y: 2 };
console.log(delete open.y);
console.log(open.y);"
        ),
        "false\ntrue\nundefined\n"
    );
}

#[test]
fn object_accessors_in_literals() {
    assert_eq!(
        both(
            "let backing: number = 1;
const obj: any = {
  get x(): number {
    return backing;
  },
  set x(next: number) {
    backing = next;
  },
};
obj.x = 10;
console.log(obj.x);"
        ),
        "10\n"
    );
}

#[test]
fn maps_and_sets_iterate_in_insertion_order() {
    assert_eq!(
        both(
            "const m = new Map();
m.set(\"b\", 2);
m.set(\"a\", 1);
for (const entry of m) {
  console.log(entry[0] + \"=\" + entry[1]);
}
const s = new Set();
s.add(3);
s.add(1);
s.add(3);
console.log(s.size);
for (const item of s) {
  console.log(item);
}"
        ),
        "b=2\na=1\n2\n3\n1\n"
    );
}

#[test]
fn weak_collections_are_identity_keyed() {
    assert_eq!(
        both(
            "const wm = new WeakMap();
const key: any = {};
wm.set(key, \"kept\");
console.log(wm.get(key));
console.log(wm.has({}));
const ws = new WeakSet();
ws.add(key);
console.log(ws.has(key));"
        ),
        "kept\nfalse\ntrue\n"
    );
}

#[test]
fn object_round_trips_preserve_values() {
    assert_eq!(
        both(
            "const original: any = { n: 1.5, s: \"text\", flag: true, inner: { deep: [1, 2] } };
const copy: any = { n: original.n, s: original.s, flag: original.flag, inner: original.inner };
console.log(copy.n);
console.log(copy.s);
console.log(copy.flag);
console.log(copy.inner.deep[1]);"
        ),
        "1.5\ntext\ntrue\n2\n"
    );
}

#[test]
fn interfaces_are_structural() {
    assert_eq!(
        both(
            "interface Shape {
  area(): number;
}
class Square implements Shape {
  side: number = 3;
  area(): number {
    return this.side * this.side;
  }
}
const shape: Shape = new Square();
console.log(shape.area());"
        ),
        "9\n"
    );
}

#[test]
fn index_signatures_accept_dynamic_keys() {
    assert_eq!(
        both(
            "interface Counts {
  [key: string]: number;
}
const counts: Counts = { apples: 1 };
counts[\"pears\"] = 4;
console.log(counts.apples + counts[\"pears\"]);"
        ),
        "5\n"
    );
}

#[test]
fn overloads_resolve_in_source_order() {
    assert_eq!(
        both(
            "function combine(a: number, b: number): number;
function combine(a: string, b: string): string;
function combine(a: any, b: any): any {
  return a + b;
}
console.log(combine(40, 2));
console.log(combine(\"4\", \"2\"));"
        ),
        "42\n42\n"
    );
}

#[test]
fn typeof_and_nullish_operators() {
    assert_eq!(
        both(
            "console.log(typeof 1);
console.log(typeof \"s\");
console.log(typeof undefined);
console.log(typeof missing);
const fallback: any = null ?? \"default\";
console.log(fallback);"
        ),
        "number\nstring\nundefined\nundefined\ndefault\n"
    );
}

#[test]
fn uncaught_throws_surface_the_error_name() {
    both_fail(
        "throw new RangeError(\"too big\");",
        &["RangeError", "too big"],
    );
}

#[test]
fn rethrow_preserves_name_message_and_stack() {
    assert_eq!(
        both(
            "function fail(): void {
  throw new TypeError(\"original\");
}
try {
  try {
    fail();
  } catch (inner) {
    inner.stack = \"trace\";
    throw inner;
  }
} catch (outer) {
  console.log(outer.name);
  console.log(outer.message);
  console.log(outer.stack);
}"
        ),
        "TypeError\noriginal\ntrace\n"
    );
}
