//! Type checker diagnostics: rejected programs abort before any user code
//! runs, with messages beginning `Type Error`, identically in both modes.

use tsar_lang::runtime::ExecMode;
use tsar_lang::{check_source, run_source_to_string};

/// Both modes must reject the program with a `Type Error` containing every
/// expected fragment.
fn rejected(source: &str, fragments: &[&str]) {
    for mode in [ExecMode::Interpret, ExecMode::Compile] {
        let error = run_source_to_string(source, mode)
            .expect_err(&format!("expected a type error for:\n{source}"));
        assert!(
            error.message.starts_with("Type Error"),
            "expected a Type Error, got '{}'",
            error.message
        );
        for fragment in fragments {
            assert!(
                error.message.contains(fragment),
                "expected '{fragment}' in '{}'",
                error.message
            );
        }
    }
}

fn accepted(source: &str) {
    check_source(source).unwrap_or_else(|e| panic!("expected to type check: {e}\n{source}"));
}

#[test]
fn primitive_mismatch_is_rejected() {
    rejected("let x: number = \"text\";", &["number"]);
    rejected("let s: string = 5;", &["string"]);
}

#[test]
fn null_and_undefined_need_a_union() {
    rejected("let n: number = null;", &["number"]);
    accepted("let n: number | null = null; n = 5;");
    accepted("let u: string | undefined = undefined;");
}

#[test]
fn tuples_are_positional_and_length_checked() {
    accepted("let pair: [number, string] = [1, \"a\"];");
    rejected("let pair: [number, string] = [\"a\", 1];", &[]);
    rejected("let pair: [number, string] = [1, \"a\", true];", &[]);
}

#[test]
fn const_reassignment_is_a_compile_time_error() {
    rejected("const c: number = 1; c = 2;", &["constant"]);
}

#[test]
fn undeclared_names_are_rejected() {
    rejected("console.log(missing + 1);", &["missing"]);
}

#[test]
fn object_width_subtyping_and_excess_properties() {
    accepted(
        "interface Named { name: string; }
const wide: any = { name: \"n\", extra: 1 };
const narrowed: Named = wide;",
    );
    rejected(
        "interface Point { x: number; y: number; }
const p: Point = { x: 1, y: 2, z: 3 };",
        &["z"],
    );
    rejected(
        "interface Point { x: number; y: number; }
const p: Point = { x: 1 };",
        &[],
    );
}

#[test]
fn class_assignability_is_nominal() {
    accepted(
        "class Base { tag: string = \"b\"; }
class Derived extends Base { extra(): void {} }
const b: Base = new Derived();",
    );
    rejected(
        "class Base { tag: string = \"b\"; }
class Derived extends Base { extra(): void {} }
const d: Derived = new Base();",
        &[],
    );
}

#[test]
fn abstract_classes_cannot_be_instantiated() {
    rejected(
        "abstract class Base {
  abstract area(): number;
}
const b = new Base();",
        &["abstract"],
    );
}

#[test]
fn concrete_subclasses_must_implement_abstract_members() {
    rejected(
        "abstract class Base {
  abstract area(): number;
}
class Circle extends Base {
}",
        &["abstract", "area"],
    );
    accepted(
        "abstract class Base {
  abstract area(): number;
}
class Circle extends Base {
  area(): number {
    return 3;
  }
}
console.log(new Circle().area());",
    );
}

#[test]
fn override_must_match_a_base_member() {
    rejected(
        "class Base { run(): void {} }
class Sub extends Base {
  override walk(): void {}
}",
        &["override"],
    );
}

#[test]
fn implements_obligations_are_checked() {
    rejected(
        "interface Shape { area(): number; }
class Blob implements Shape {
}",
        &["Shape"],
    );
    rejected(
        "interface Shape { area(): number; }
class Blob implements Shape {
  area(): string {
    return \"big\";
  }
}",
        &["Shape"],
    );
}

#[test]
fn this_is_rejected_outside_classes() {
    rejected("console.log(this.x);", &["this"]);
}

#[test]
fn function_arity_and_argument_types() {
    rejected(
        "function add(a: number, b: number): number { return a + b; }
add(1);",
        &[],
    );
    rejected(
        "function add(a: number, b: number): number { return a + b; }
add(1, \"two\");",
        &[],
    );
    accepted(
        "function add(a: number, b?: number): number { return a + (b ?? 0); }
add(1);",
    );
}

#[test]
fn function_parameters_relate_contravariantly() {
    accepted(
        "function run(callback: (a: number, b: number) => void): void {
  callback(1, 2);
}
run((a: number) => {});",
    );
    rejected(
        "function run(callback: (a: number) => void): void {
  callback(1);
}
run((a: number, b: number, c: number) => {});",
        &[],
    );
}

#[test]
fn return_types_are_enforced() {
    rejected(
        "function label(): string {
  return 42;
}",
        &["string"],
    );
}

#[test]
fn overload_resolution_picks_by_source_order() {
    accepted(
        "function combine(a: number, b: number): number;
function combine(a: string, b: string): string;
function combine(a: any, b: any): any {
  return a + b;
}
const n: number = combine(1, 2);
const s: string = combine(\"a\", \"b\");",
    );
    rejected(
        "function combine(a: number, b: number): number;
function combine(a: string, b: string): string;
function combine(a: any, b: any): any {
  return a + b;
}
combine(true, false);",
        &["overload"],
    );
}

#[test]
fn generic_constraints_are_enforced() {
    accepted(
        "function longest<T extends { length: number }>(a: T, b: T): T {
  return a.length >= b.length ? a : b;
}
longest(\"ab\", \"abcd\");
longest([1], [1, 2]);",
    );
    rejected(
        "function longest<T extends { length: number }>(a: T, b: T): T {
  return a.length >= b.length ? a : b;
}
longest(1, 2);",
        &["constraint"],
    );
}

#[test]
fn generic_inference_conflicts_are_errors() {
    rejected(
        "function pair<T>(a: T, b: T): T[] {
  return [a, b];
}
pair(1, \"two\");",
        &[],
    );
}

#[test]
fn keyof_produces_property_name_unions() {
    accepted(
        "interface Point { x: number; y: number; }
type PointKey = keyof Point;
const k: PointKey = \"x\";",
    );
    rejected(
        "interface Point { x: number; y: number; }
type PointKey = keyof Point;
const k: PointKey = \"z\";",
        &[],
    );
}

#[test]
fn index_access_types_resolve_to_property_types() {
    accepted(
        "interface Config { port: number; host: string; }
const port: Config[\"port\"] = 8080;",
    );
    rejected(
        "interface Config { port: number; host: string; }
const port: Config[\"port\"] = \"8080\";",
        &[],
    );
}

#[test]
fn index_signature_writes_are_checked() {
    accepted(
        "interface Counts { [key: string]: number; }
const counts: Counts = {};
counts[\"a\"] = 1;",
    );
    rejected(
        "interface Counts { [key: string]: number; }
const counts: Counts = {};
counts[\"a\"] = \"one\";",
        &[],
    );
}

#[test]
fn unknown_properties_are_rejected() {
    rejected(
        "class Point { x: number = 0; }
const p = new Point();
console.log(p.z);",
        &["z"],
    );
}

#[test]
fn private_members_are_inaccessible_outside_their_class() {
    rejected(
        "class Vault {
  private secret: number = 7;
}
console.log(new Vault().secret);",
        &["private"],
    );
}

#[test]
fn readonly_fields_only_assign_in_the_constructor() {
    accepted(
        "class Tag {
  readonly label: string;
  constructor(label: string) {
    this.label = label;
  }
}",
    );
    rejected(
        "class Tag {
  readonly label: string = \"fixed\";
}
new Tag().label = \"changed\";",
        &["read-only"],
    );
}

#[test]
fn unions_check_both_directions() {
    accepted("let value: number | string = 1; value = \"text\";");
    rejected("let value: number | string = true;", &[]);
    rejected(
        "let source: number | string = 1;
let target: number = source;",
        &[],
    );
}

#[test]
fn calling_a_class_without_new_is_rejected() {
    rejected(
        "class Widget {}
Widget();",
        &["new"],
    );
}

#[test]
fn rejection_is_mode_independent() {
    // both back-ends see the same checker verdict before any code runs
    let source = "let x: number = \"oops\"; console.log(x);";
    let interpreted = run_source_to_string(source, ExecMode::Interpret).unwrap_err();
    let compiled = run_source_to_string(source, ExecMode::Compile).unwrap_err();
    assert_eq!(interpreted.message, compiled.message);
    assert!(interpreted.message.contains("Type Error"));
}
