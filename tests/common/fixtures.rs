//! Static CSV corpora used across harnesses.

/// A session as a log4net/NLog CSV target writes it: header, plain records,
/// a multi-line exception and a message containing the delimiter.
pub const SESSION_CSV: &str = "\
sequence,time,level,thread,class,method,message,exception,file
1,2024/01/15 10:00:00.000,Info,main,Shop.Startup,Main,Service starting,,
2,2024/01/15 10:00:00.150,Debug,main,Shop.Db.Pool,Open,\"pool size 8, timeout 30s\",,
3,2024/01/15 10:00:01.020,Warn,worker-1,Shop.Db.Query,Execute,Slow query,,C:\\src\\Query.cs:88
4,2024/01/15 10:00:02.500,Error,worker-2,Shop.Billing,Charge,Payment failed,\"System.TimeoutException: gateway
   at Shop.Billing.Charge()
   at Shop.Api.Post()\",
5,2024/01/15 10:00:03.000,Info,main,Shop.Billing,Charge,Retry 2 succeeded,,
";

/// The messages of [`SESSION_CSV`] in order.
pub const SESSION_MESSAGES: &[&str] = &[
    "Service starting",
    "pool size 8, timeout 30s",
    "Slow query",
    "Payment failed",
    "Retry 2 succeeded",
];

/// Records with problems the parser must survive: a bad sequence number, an
/// unknown level and a short record, each followed by a good one.
pub const DAMAGED_CSV: &str = "\
x1,2024/01/15 10:00:00.000,Info,main,App,Run,bad sequence,,
10,2024/01/15 10:00:00.000,Info,main,App,Run,ok one,,
11,2024/01/15 10:00:00.000,Loud,main,App,Run,bad level,,
12,2024/01/15 10:00:00.000,Info,main,App,Run,ok two,,
13,2024/01/15 10:00:00.000,Info,main,App
14,2024/01/15 10:00:00.000,Info,main,App,Run,ok three,,
";
