//! Generator and async state-machine behavior, asserted identical across
//! both execution modes.

use tsar_lang::runtime::ExecMode;
use tsar_lang::run_source_to_string;

fn both(source: &str) -> String {
    let interpreted = run_source_to_string(source, ExecMode::Interpret)
        .unwrap_or_else(|e| panic!("interpreter failed: {e}\n{source}"));
    let compiled = run_source_to_string(source, ExecMode::Compile)
        .unwrap_or_else(|e| panic!("compiler failed: {e}\n{source}"));
    assert_eq!(interpreted, compiled, "modes diverged for:\n{source}");
    interpreted
}

#[test]
fn yield_delegation_forwards_every_value() {
    assert_eq!(
        both(
            "function* inner(): any {
  yield 2;
  yield 3;
}
function* outer(): any {
  yield 1;
  yield* inner();
  yield 4;
}
for (const value of outer()) {
  console.log(value);
}"
        ),
        "1\n2\n3\n4\n"
    );
}

#[test]
fn yield_delegation_result_is_the_delegate_return_value() {
    assert_eq!(
        both(
            "function* inner(): any {
  yield 1;
  return 10;
}
function* outer(): any {
  const result = yield* inner();
  console.log(\"inner returned \" + result);
}
for (const value of outer()) {
  console.log(value);
}"
        ),
        "1\ninner returned 10\n"
    );
}

#[test]
fn yield_delegation_over_map_and_set_preserves_insertion_order() {
    assert_eq!(
        both(
            "function* entries(): any {
  const m = new Map();
  m.set(\"x\", 1);
  m.set(\"y\", 2);
  yield* m;
  const s = new Set();
  s.add(\"late\");
  s.add(\"later\");
  yield* s;
}
for (const item of entries()) {
  console.log(item);
}"
        ),
        "x,1\ny,2\nlate\nlater\n"
    );
}

#[test]
fn generators_resume_with_sent_values() {
    assert_eq!(
        both(
            "function* accumulate(): any {
  let total: number = 0;
  while (total < 10) {
    total = total + (yield total);
  }
  return total;
}
const it: any = accumulate();
console.log(it.next().value);
console.log(it.next(4).value);
console.log(it.next(7).value);
console.log(it.next().done);"
        ),
        "0\n4\n11\ntrue\n"
    );
}

#[test]
fn generator_objects_are_their_own_iterator() {
    assert_eq!(
        both(
            "function* pair(): any {
  yield \"a\";
  yield \"b\";
}
const it: any = pair();
const same: any = it[Symbol.iterator]();
console.log(same === it);
for (const value of it) {
  console.log(value);
}"
        ),
        "true\na\nb\n"
    );
}

#[test]
fn generator_return_runs_finally_blocks() {
    assert_eq!(
        both(
            "function* guarded(): any {
  try {
    yield 1;
    yield 2;
  } finally {
    console.log(\"cleanup\");
  }
}
const it: any = guarded();
console.log(it.next().value);
const last: any = it.return(9);
console.log(last.value);
console.log(last.done);
console.log(it.next().done);"
        ),
        "1\ncleanup\n9\ntrue\ntrue\n"
    );
}

#[test]
fn generator_throw_resumes_inside_the_handler() {
    assert_eq!(
        both(
            "function* resilient(): any {
  try {
    yield 1;
  } catch (e) {
    yield \"caught \" + e.message;
  }
}
const it: any = resilient();
it.next();
console.log(it.throw(new Error(\"probe\")).value);"
        ),
        "caught probe\n"
    );
}

#[test]
fn custom_iterator_protocol_objects_are_iterable() {
    assert_eq!(
        both(
            "function range(limit: number): any {
  let current: number = 0;
  return {
    next(): any {
      if (current >= limit) {
        return { value: undefined, done: true };
      }
      current = current + 1;
      return { value: current, done: false };
    },
  };
}
function* viaProtocol(): any {
  yield* range(3);
}
for (const n of viaProtocol()) {
  console.log(n);
}"
        ),
        "1\n2\n3\n"
    );
}

#[test]
fn async_methods_read_and_write_this_across_await() {
    assert_eq!(
        both(
            "class Counter {
  value: number = 0;
  async increment(): Promise<void> {
    this.value = this.value + 1;
  }
}
async function main(): Promise<void> {
  const counter = new Counter();
  console.log(counter.value);
  await counter.increment();
  console.log(counter.value);
  await counter.increment();
  console.log(counter.value);
}
main();"
        ),
        "0\n1\n2\n"
    );
}

#[test]
fn compound_this_assignment_as_expression_inside_async_method() {
    assert_eq!(
        both(
            "class Store {
  value: number = 10;
  async bump(next: number): Promise<number> {
    return this.value = next;
  }
  async add(): Promise<void> {
    this.value += 5;
  }
}
async function main(): Promise<void> {
  const store = new Store();
  console.log(await store.bump(20));
  await store.add();
  console.log(store.value);
}
main();"
        ),
        "20\n25\n"
    );
}

#[test]
fn async_functions_run_to_the_first_await_synchronously() {
    assert_eq!(
        both(
            "async function task(): Promise<void> {
  console.log(\"task start\");
  await 0;
  console.log(\"task resumed\");
}
console.log(\"before\");
task();
console.log(\"after\");"
        ),
        "before\ntask start\nafter\ntask resumed\n"
    );
}

#[test]
fn awaited_resumptions_are_serviced_in_fifo_order() {
    assert_eq!(
        both(
            "async function worker(name: string): Promise<void> {
  await 0;
  console.log(name);
}
worker(\"first\");
worker(\"second\");
worker(\"third\");"
        ),
        "first\nsecond\nthird\n"
    );
}

#[test]
fn await_wraps_plain_values() {
    assert_eq!(
        both(
            "async function main(): Promise<void> {
  const n: any = await 42;
  console.log(n);
}
main();"
        ),
        "42\n"
    );
}

#[test]
fn async_results_flow_between_async_functions() {
    assert_eq!(
        both(
            "async function produce(): Promise<number> {
  await 0;
  return 21;
}
async function consume(): Promise<void> {
  const half: any = await produce();
  console.log(half * 2);
}
consume();"
        ),
        "42\n"
    );
}

#[test]
fn uncaught_async_throw_rejects_the_returned_promise() {
    for mode in [ExecMode::Interpret, ExecMode::Compile] {
        let error = run_source_to_string(
            "async function explode(): Promise<void> {
  await 0;
  throw new RangeError(\"async boom\");
}
explode();",
            mode,
        )
        .expect_err("expected the rejection to surface");
        assert!(error.message.contains("RangeError"), "{}", error.message);
        assert!(error.message.contains("async boom"), "{}", error.message);
    }
}

#[test]
fn async_rejections_are_catchable_by_awaiters() {
    assert_eq!(
        both(
            "async function explode(): Promise<void> {
  throw new Error(\"handled\");
}
async function main(): Promise<void> {
  try {
    await explode();
  } catch (e) {
    console.log(\"caught \" + e.message);
  }
}
main();"
        ),
        "caught handled\n"
    );
}

#[test]
fn async_generators_yield_promised_steps() {
    assert_eq!(
        both(
            "async function* stream(): any {
  yield 1;
  yield 2;
}
async function main(): Promise<void> {
  const it: any = stream();
  const first: any = await it.next();
  console.log(first.value);
  const second: any = await it.next();
  console.log(second.value);
  const end: any = await it.next();
  console.log(end.done);
}
main();"
        ),
        "1\n2\ntrue\n"
    );
}
