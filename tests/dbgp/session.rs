use crate::common::{free_port, init_msg, transaction_id, Engine};
use dbgp::{Client, Connection, ConnectionConfig, Error};
use serial_test::serial;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn start() -> (u16, Connection) {
    let port = free_port();
    let conn = Connection::new(
        ConnectionConfig::listen("127.0.0.1", port).with_timeout(Duration::from_secs(5)),
    );
    (port, conn)
}

#[test]
#[serial]
fn test_php_session() {
    let (port, conn) = start();
    let (tx, rx) = mpsc::channel();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(&init_msg("PHP"));

        let mut commands = vec![];
        commands.push(engine.reply(r#"feature_name="max_depth" supported="1""#, "1"));
        commands.push(engine.reply(r#"feature="max_depth" success="1""#, ""));
        commands.push(engine.reply(r#"state="enabled" id="18210001""#, ""));
        commands.push(engine.reply(r#"status="break" reason="ok""#, ""));
        commands.push(engine.reply(
            "",
            r#"<stack where="App\Foo->bar" level="0" type="file" filename="file:///srv/app/Foo.php" lineno="12"/><stack where="{main}" level="1" type="file" filename="file:///srv/app/index.php" lineno="5"/>"#,
        ));
        commands.push(engine.reply(
            "",
            r#"<context name="Locals" id="0"/><context name="Superglobals" id="1"/><context name="User defined constants" id="2"/>"#,
        ));
        commands.push(engine.reply(
            r#"context="0""#,
            r#"<property name="$items" fullname="$items" type="array" children="1" numchildren="2" page="0" pagesize="32"><property name="0" fullname="$items[0]" type="int"><![CDATA[7]]></property><property name="name" fullname="$items['name']" type="string" size="3" encoding="base64"><![CDATA[Zm9v]]></property></property><property name="$this" fullname="$this" type="object" classname="App\Foo" children="1" numchildren="1"><property name="id" fullname="$this->id" facet="private" type="int"><![CDATA[1]]></property></property><property name="$unset" fullname="$unset" type="uninitialized"/>"#,
        ));
        commands.push(engine.reply(
            "",
            r#"<property name="$items" fullname="$items" type="array" children="1" numchildren="2"><property name="0" fullname="$items[0]" type="int"><![CDATA[7]]></property><property name="name" fullname="$items['name']" type="string" size="3" encoding="base64"><![CDATA[Zm9v]]></property></property>"#,
        ));
        commands.push(engine.reply(
            "",
            r#"<property type="array" children="1" numchildren="1"><property name="k" type="string" size="1" encoding="base64"><![CDATA[dg==]]></property></property>"#,
        ));
        commands.push(engine.reply(r#"status="stopping" reason="ok""#, ""));
        tx.send(commands).unwrap();
    });

    let mut client = Client::new(conn).unwrap();
    assert_eq!(client.init().language, "php");

    let feature = client.feature_get("max_depth").unwrap();
    assert!(feature.is_supported().unwrap());
    assert_eq!(feature.to_string(), "1");
    client.feature_set("max_depth", "2").unwrap();

    let bp = client
        .breakpoint_set("-t line -f file:///srv/app/Foo.php -n 12")
        .unwrap();
    assert_eq!(bp.breakpoint_id().unwrap(), 18210001);

    assert_eq!(client.run().unwrap().status().unwrap(), "break");

    let stack = client.stack_get().unwrap().stack().unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(stack[0].location.as_deref(), Some("App\\Foo->bar"));
    assert_eq!(stack[0].lineno, 12);
    assert_eq!(stack[1].level, 1);

    let names = client.context_names().unwrap().context_names().unwrap();
    assert_eq!(names.get(&2).map(String::as_str), Some("User defined constants"));

    let context = client.context_get(0, 0).unwrap();
    let trees = context.properties().unwrap();
    assert_eq!(trees.len(), 3);
    let items = &trees[0];
    assert_eq!(items.root().type_and_size(), "array [2]");
    let children: Vec<_> = items.children(items.root_id()).map(|(_, p)| p).collect();
    assert_eq!(children[0].display_name, "$items[0]");
    assert_eq!(children[0].value, "7");
    assert!(!children[0].is_last_child);
    assert_eq!(children[1].value, "`foo`");
    assert!(children[1].is_last_child);
    assert_eq!(trees[1].root().ty, "App\\Foo");
    assert_eq!(trees[2].root().value, "");

    let list = context.property_list().unwrap();
    let names: Vec<_> = list.iter().map(|p| p.display_name.as_str()).collect();
    assert_eq!(
        names,
        ["$items", "$items[0]", "$items['name']", "$this", "$this->id", "$unset"]
    );

    let prop = client.property_get("$items").unwrap();
    assert_eq!(prop.properties().unwrap()[0].len(), 3);

    let eval = client.eval("$x").unwrap();
    let evaluated = eval.property_list().unwrap();
    assert_eq!(evaluated[0].display_name, "$x");
    assert_eq!(evaluated[1].display_name, "$x['k']");
    assert_eq!(evaluated[1].value, "`v`");

    let detach = client.detach().unwrap();
    assert_eq!(detach.status().unwrap(), "stopping");
    assert!(!client.is_connected());

    engine.join().unwrap();
    let commands = rx.recv().unwrap();
    let ids: Vec<_> = commands.iter().map(|c| transaction_id(c)).collect();
    assert_eq!(ids, (1..=10).collect::<Vec<_>>());
    assert_eq!(commands[0], "feature_get -i 1 -n max_depth");
    assert_eq!(commands[6], "context_get -i 7 -c 0 -d 0");
    assert_eq!(commands[7], r#"property_get -i 8 -n "$items" -d 0"#);
    assert_eq!(commands[8], "eval -i 9 -- JHg=");
    assert_eq!(commands[9], "detach -i 10");
}

#[test]
#[serial]
fn test_engine_errors() {
    let (port, conn) = start();
    let engine = thread::spawn(move || {
        let mut engine = Engine::connect(port);
        engine.send(&init_msg("python"));
        engine.reply(
            "",
            r#"<error code="4"><message><![CDATA[unimplemented command]]></message></error>"#,
        );
        engine.reply(
            "",
            r#"<error code="206"><message><![CDATA[invalid syntax]]></message></error>"#,
        );
        engine.reply(
            "",
            r#"<error code="300"><message><![CDATA[can not get property]]></message></error>"#,
        );
        engine.reply(
            "",
            r#"<property name="x" type="list" numchildren="2"><property name="[0]" type="int">1</property><property name="[1]" type="str" encoding="base64">YWJj</property></property>"#,
        );
    });

    let mut client = Client::new(conn).unwrap();
    assert!(matches!(
        client.feature_get("notify_ok"),
        Err(Error::CommandNotImplemented)
    ));
    match client.eval("1 +").unwrap_err() {
        Error::Evaluation { message } => assert_eq!(message.as_deref(), Some("invalid syntax")),
        e => panic!("unexpected error {e:?}"),
    }
    match client.property_get("missing").unwrap_err() {
        Error::Reported { code, message } => {
            assert_eq!(code, 300);
            assert_eq!(message.as_deref(), Some("can not get property"));
        }
        e => panic!("unexpected error {e:?}"),
    }

    // engine errors don't break the session
    assert!(client.is_connected());
    let eval = client.eval("xs").unwrap();
    let names: Vec<_> = eval
        .property_list()
        .unwrap()
        .into_iter()
        .map(|p| (p.display_name, p.value))
        .collect();
    assert_eq!(
        names,
        [
            ("xs".to_string(), String::new()),
            ("xs[0]".to_string(), "1".to_string()),
            ("xs[1]".to_string(), "`abc`".to_string()),
        ]
    );
    assert_eq!(client.transaction_id(), 4);

    engine.join().unwrap();
}
